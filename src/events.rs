//! 生命周期事件：文件变更、消息、阶段、Action、LLM 调用与错误
//!
//! EventBus 是同步的发布/订阅：按步骤完成的顺序逐个通知订阅者。
//! 单个订阅者 panic 会被捕获并记录日志，不影响其余订阅者，也不会中断流水线。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::AgentStage;
use crate::memory::Role;
use crate::pipeline::ActionKind;

/// 单个事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    FileCreated { path: String, version: u64 },
    FileUpdated { path: String, version: u64 },
    FileDeleted { path: String },
    MessageAppended { id: String, role: Role },
    StageStart { stage: AgentStage },
    StageComplete { stage: AgentStage },
    ActionStart { id: String, kind: ActionKind, path: String },
    ActionComplete { id: String, path: String },
    ActionFailed { id: String, path: String, reason: String },
    LlmStart { stage: AgentStage },
    LlmComplete { stage: AgentStage, chars: usize },
    LlmStreamStart { stage: AgentStage },
    /// 流式输出的一个片段（按到达顺序）
    LlmChunk { stage: AgentStage, delta: String },
    LlmStreamComplete { stage: AgentStage, chars: usize },
    Error { message: String },
}

impl PipelineEvent {
    /// 事件名（与 serde tag 一致）
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::FileCreated { .. } => "file_created",
            PipelineEvent::FileUpdated { .. } => "file_updated",
            PipelineEvent::FileDeleted { .. } => "file_deleted",
            PipelineEvent::MessageAppended { .. } => "message_appended",
            PipelineEvent::StageStart { .. } => "stage_start",
            PipelineEvent::StageComplete { .. } => "stage_complete",
            PipelineEvent::ActionStart { .. } => "action_start",
            PipelineEvent::ActionComplete { .. } => "action_complete",
            PipelineEvent::ActionFailed { .. } => "action_failed",
            PipelineEvent::LlmStart { .. } => "llm_start",
            PipelineEvent::LlmComplete { .. } => "llm_complete",
            PipelineEvent::LlmStreamStart { .. } => "llm_stream_start",
            PipelineEvent::LlmChunk { .. } => "llm_chunk",
            PipelineEvent::LlmStreamComplete { .. } => "llm_stream_complete",
            PipelineEvent::Error { .. } => "error",
        }
    }
}

type Listener = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// 订阅 ID，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    entries: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

/// 同步事件总线
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&PipelineEvent) + Send + Sync + 'static) -> ListenerId {
        let mut guard = match self.listeners.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = ListenerId(guard.next_id);
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(listener)));
        id
    }

    /// 将事件转发到 tokio 无界通道（接收端关闭后静默丢弃）
    pub fn subscribe_channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |ev| {
            let _ = tx.send(ev.clone());
        });
        (id, rx)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut guard = match self.listeners.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = guard.entries.len();
        guard.entries.retain(|(lid, _)| *lid != id);
        guard.entries.len() != before
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(g) => g.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }

    /// 逐个通知订阅者；订阅者 panic 只记录日志
    pub fn emit(&self, event: PipelineEvent) {
        let listeners: Vec<Listener> = match self.listeners.lock() {
            Ok(g) => g.entries.iter().map(|(_, l)| l.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().entries.iter().map(|(_, l)| l.clone()).collect(),
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::error!("event listener panicked while handling {}", event.name());
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_panicking_listener_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe(|_| panic!("broken observer"));
        let h = hits.clone();
        bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(PipelineEvent::StageStart { stage: AgentStage::Intent });
        bus.emit(PipelineEvent::StageComplete { stage: AgentStage::Intent });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_channel_preserves_order() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe_channel();
        bus.emit(PipelineEvent::FileCreated { path: "/a.ts".into(), version: 1 });
        bus.emit(PipelineEvent::FileDeleted { path: "/a.ts".into() });
        assert_eq!(rx.try_recv().unwrap().name(), "file_created");
        assert_eq!(rx.try_recv().unwrap().name(), "file_deleted");
    }

    #[test]
    fn test_event_json_tag() {
        let json = serde_json::to_value(PipelineEvent::LlmChunk {
            stage: AgentStage::Executing,
            delta: "ab".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "llm_chunk");
        assert_eq!(json["stage"], "executing");
    }
}
