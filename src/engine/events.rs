// ==========================================
// Voltech 采集系统 - 引擎层事件发布
// ==========================================
// 职责: 定义监听/导入事件与发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，App 层桥接到前端（Tauri emit_all）
// 语义: 至少一次、后到覆盖；订阅方丢失中间进度不影响正确性
// ==========================================

use crate::domain::progress::{BatchProgress, MaintenanceProgress, WatcherProgress};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// 广播通道容量（慢订阅者会丢失旧事件，latest 通道兜底）
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ==========================================
// 事件类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WatcherEvent {
    /// 监听暂停（手动或存储不可用）
    WatcherPaused { reason: String },
    WatcherResumed,
    /// 监听停止；reason 为空表示正常停止
    WatcherStopped { reason: Option<String> },
    WatcherProgress(WatcherProgress),
    BatchProgress(BatchProgress),
    MaintenanceStart { days: i64 },
    MaintenanceProgress(MaintenanceProgress),
    MaintenanceComplete(MaintenanceProgress),
}

impl WatcherEvent {
    /// 前端事件名
    pub fn event_name(&self) -> &'static str {
        match self {
            WatcherEvent::WatcherPaused { .. } => "voltech-watcher-paused",
            WatcherEvent::WatcherResumed => "voltech-watcher-resumed",
            WatcherEvent::WatcherStopped { .. } => "voltech-watcher-stopped",
            WatcherEvent::WatcherProgress(_) => "voltech-watcher-progress",
            WatcherEvent::BatchProgress(_) => "voltech-batch-progress",
            WatcherEvent::MaintenanceStart { .. } => "voltech-maintenance-start",
            WatcherEvent::MaintenanceProgress(_) => "voltech-maintenance-progress",
            WatcherEvent::MaintenanceComplete(_) => "voltech-maintenance-complete",
        }
    }

    /// 前端事件负载
    pub fn payload(&self) -> JsonValue {
        match self {
            WatcherEvent::WatcherPaused { reason } => JsonValue::String(reason.clone()),
            WatcherEvent::WatcherResumed => JsonValue::Null,
            WatcherEvent::WatcherStopped { reason } => {
                reason.clone().map(JsonValue::String).unwrap_or(JsonValue::Null)
            }
            WatcherEvent::WatcherProgress(p) => serde_json::to_value(p).unwrap_or_default(),
            WatcherEvent::BatchProgress(p) => serde_json::to_value(p).unwrap_or_default(),
            WatcherEvent::MaintenanceStart { days } => JsonValue::from(*days),
            WatcherEvent::MaintenanceProgress(p) | WatcherEvent::MaintenanceComplete(p) => {
                serde_json::to_value(p).unwrap_or_default()
            }
        }
    }

    /// 是否为进度快照（可被后续快照覆盖）
    pub fn is_snapshot(&self) -> bool {
        matches!(
            self,
            WatcherEvent::WatcherProgress(_)
                | WatcherEvent::BatchProgress(_)
                | WatcherEvent::MaintenanceProgress(_)
        )
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 监听事件发布者 Trait
///
/// # 实现说明
/// - `BroadcastEventPublisher`: 进程内广播，App 层订阅后转发到前端
/// - `NoOpEventPublisher`: 测试或无界面运行
pub trait WatcherEventPublisher: Send + Sync {
    /// 发布事件；失败不应影响导入流程，调用方只记录日志
    fn publish(&self, event: WatcherEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl WatcherEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: WatcherEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!("NoOpEventPublisher: 跳过事件 - {}", event.event_name());
        Ok(())
    }
}

// ==========================================
// 广播发布者
// ==========================================

/// broadcast 保序分发 + watch 保留最新一条
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<WatcherEvent>,
    latest: watch::Sender<Option<WatcherEvent>>,
}

impl BroadcastEventPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (latest, _) = watch::channel(None);
        Self { sender, latest }
    }

    /// 订阅全部事件
    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.sender.subscribe()
    }

    /// 订阅最新事件（晚加入的订阅者立即拿到当前快照）
    pub fn latest(&self) -> watch::Receiver<Option<WatcherEvent>> {
        self.latest.subscribe()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherEventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: WatcherEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.latest.send_replace(Some(event.clone()));
        // 无订阅者时 send 返回 Err，属正常情况
        if self.sender.send(event).is_err() {
            tracing::trace!("BroadcastEventPublisher: 当前没有订阅者");
        }
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn WatcherEventPublisher>> 的使用；发布失败只记日志
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn WatcherEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn WatcherEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn publish(&self, event: WatcherEvent) {
        match &self.inner {
            Some(publisher) => {
                let name = event.event_name();
                if let Err(e) = publisher.publish(event) {
                    tracing::warn!(event = name, error = %e, "事件发布失败");
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - {}",
                    event.event_name()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            WatcherEvent::WatcherPaused {
                reason: "x".to_string()
            }
            .event_name(),
            "voltech-watcher-paused"
        );
        assert_eq!(
            WatcherEvent::MaintenanceComplete(MaintenanceProgress::default()).event_name(),
            "voltech-maintenance-complete"
        );
        assert_eq!(
            WatcherEvent::MaintenanceStart { days: 30 }.payload(),
            serde_json::json!(30)
        );
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        assert!(publisher.publish(WatcherEvent::WatcherResumed).is_ok());
    }

    #[test]
    fn test_broadcast_delivers_and_keeps_latest() {
        let publisher = BroadcastEventPublisher::new();
        let mut rx = publisher.subscribe();
        let latest = publisher.latest();

        publisher
            .publish(WatcherEvent::BatchProgress(BatchProgress {
                files_processed: 1,
                records_inserted: 5,
                errors: vec![],
            }))
            .unwrap();
        publisher.publish(WatcherEvent::WatcherResumed).unwrap();

        assert!(matches!(rx.try_recv(), Ok(WatcherEvent::BatchProgress(_))));
        assert_eq!(rx.try_recv().ok(), Some(WatcherEvent::WatcherResumed));
        assert_eq!(*latest.borrow(), Some(WatcherEvent::WatcherResumed));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastEventPublisher::new();
        assert!(publisher.publish(WatcherEvent::WatcherResumed).is_ok());
    }

    #[test]
    fn test_optional_publisher() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish(WatcherEvent::WatcherResumed);

        let noop = Arc::new(NoOpEventPublisher) as Arc<dyn WatcherEventPublisher>;
        assert!(OptionalEventPublisher::with_publisher(noop).is_configured());
    }
}
