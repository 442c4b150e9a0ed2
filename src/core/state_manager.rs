//! 版本化状态管理器
//!
//! 独占持有 AgentState、虚拟文件系统与有界快照队列。对外提供：
//! - 批量文件变更（每批版本号 +1）
//! - 只追加的消息与阶段历史
//! - 事务：失败时从事务前快照完整恢复
//! - 快照 / 按版本回滚
//! - 委托给存储协作者的持久化（开启 auto_save 时每次变更后保存，失败直接向上传播，不重试）

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::core::state::now_millis;
use crate::core::{AgentError, AgentStage, AgentState, PhaseResult, Snapshot};
use crate::events::{EventBus, PipelineEvent};
use crate::memory::{Message, Role};
use crate::storage::{StateStorage, Subscription, WatchCallback};
use crate::vfs::{ChangeOp, FileChange, FileState, LanguageMap, VirtualFile, VirtualFileSystem};

/// 状态管理器配置
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub auto_save: bool,
    /// 快照队列上限（至少 1）
    pub max_snapshots: usize,
    pub languages: LanguageMap,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            max_snapshots: 10,
            languages: LanguageMap::default(),
        }
    }
}

/// 初始化时注入的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedFile {
    pub path: String,
    pub content: String,
    pub language: Option<String>,
}

impl SeedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language: None,
        }
    }
}

/// 状态管理器
pub struct StateManager {
    state: AgentState,
    vfs: VirtualFileSystem,
    snapshots: VecDeque<Snapshot>,
    storage: Box<dyn StateStorage>,
    config: StateConfig,
    events: Option<Arc<EventBus>>,
    initialized: bool,
}

impl StateManager {
    pub fn new(storage: Box<dyn StateStorage>, config: StateConfig) -> Self {
        Self {
            state: AgentState::new(),
            vfs: VirtualFileSystem::new(config.languages.clone()),
            snapshots: VecDeque::new(),
            storage,
            config,
            events: None,
            initialized: false,
        }
    }

    /// 文件变更与消息追加时向该总线发事件
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub(crate) fn set_events(&mut self, events: Arc<EventBus>) {
        self.events = Some(events);
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    fn auto_save(&self) -> Result<(), AgentError> {
        if self.config.auto_save {
            self.persist()?;
        }
        Ok(())
    }

    /// 首次调用：优先加载已保存状态；否则用 seed 初始化；都没有则为空状态。三种情况最后都拍一次快照。
    /// 再次调用不做任何事。
    pub fn initialize(&mut self, seed: Option<Vec<SeedFile>>) -> Result<(), AgentError> {
        if self.initialized {
            return Ok(());
        }

        if let Some(saved) = self.storage.load()? {
            tracing::info!(
                version = saved.version,
                files = saved.files.len(),
                messages = saved.messages.len(),
                "Restored agent state from storage"
            );
            self.vfs.restore_state(saved.files.clone());
            self.state = saved;
        } else if let Some(seed) = seed {
            self.state = AgentState::new();
            self.vfs.clear();
            for file in &seed {
                self.vfs.write(&file.path, file.content.clone(), file.language.as_deref());
            }
            self.state.files = self.vfs.export_state();
            tracing::info!(files = seed.len(), "Seeded agent state");
            self.auto_save()?;
        } else {
            self.state = AgentState::new();
            self.vfs.clear();
            tracing::info!("Starting from empty agent state");
        }

        self.initialized = true;
        self.snapshot();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 应用一批文件变更；非空批次整体只让 version +1。空批次不做任何事。
    pub fn mutate_files(&mut self, changes: &[FileChange]) -> Result<Vec<VirtualFile>, AgentError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        // 按批内顺序推演每条变更前文件是否存在，用于区分 created / updated 事件
        let mut present: HashSet<&str> = HashSet::new();
        let mut absent: HashSet<&str> = HashSet::new();
        let existed: Vec<bool> = changes
            .iter()
            .map(|c| {
                let path = c.path.as_str();
                let before = present.contains(path) || (!absent.contains(path) && self.vfs.exists(path));
                if c.op == ChangeOp::Delete {
                    present.remove(path);
                    absent.insert(path);
                } else {
                    absent.remove(path);
                    present.insert(path);
                }
                before
            })
            .collect();
        let results = self.vfs.apply_batch(changes);
        self.state.files = self.vfs.export_state();
        self.state.version += 1;
        self.state.touch();

        tracing::debug!(
            changes = changes.len(),
            version = self.state.version,
            "Applied file changes"
        );

        for ((change, file), existed) in changes.iter().zip(&results).zip(existed) {
            let event = match change.op {
                ChangeOp::Delete => PipelineEvent::FileDeleted {
                    path: file.path.clone(),
                },
                _ if existed => PipelineEvent::FileUpdated {
                    path: file.path.clone(),
                    version: file.version,
                },
                _ => PipelineEvent::FileCreated {
                    path: file.path.clone(),
                    version: file.version,
                },
            };
            self.emit(event);
        }

        self.auto_save()?;
        Ok(results)
    }

    /// 追加消息（不改变 version）
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Result<Message, AgentError> {
        let message = Message::new(role, content);
        self.state.messages.push(message.clone());
        self.state.touch();
        self.emit(PipelineEvent::MessageAppended {
            id: message.id.clone(),
            role,
        });
        self.auto_save()?;
        Ok(message)
    }

    /// 记录当前阶段；是否合法由流水线决定
    pub fn set_stage(&mut self, stage: AgentStage) -> Result<(), AgentError> {
        self.state.stage = stage;
        self.state.touch();
        self.auto_save()
    }

    pub fn record_phase_result(&mut self, result: PhaseResult) -> Result<(), AgentError> {
        self.state.history.push(result);
        self.state.touch();
        self.auto_save()
    }

    /// 事务：先拍快照再执行 f；f 返回错误时从该快照完整恢复并返回原错误，成功时持久化并返回结果。
    /// 开启 auto_save 时恢复后的状态也会写回存储，覆盖 f 内部已保存的中间结果。
    /// 快照本身留在队列中。
    pub fn run_transaction<T, F>(&mut self, f: F) -> Result<T, AgentError>
    where
        F: FnOnce(&mut StateManager) -> Result<T, AgentError>,
    {
        let before = self.snapshot();
        match f(self) {
            Ok(value) => {
                self.auto_save()?;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(version = before.version, "Transaction failed, restoring snapshot: {}", err);
                self.restore_from(&before);
                if let Err(save_err) = self.auto_save() {
                    tracing::error!("Failed to persist restored state: {}", save_err);
                }
                Err(err)
            }
        }
    }

    /// 深拷贝当前状态入队；超过上限时淘汰最旧的
    pub fn snapshot(&mut self) -> Snapshot {
        let mut state = self.state.clone();
        state.files = self.vfs.export_state();
        let snapshot = Snapshot {
            version: state.version,
            timestamp: now_millis(),
            state,
        };
        self.snapshots.push_back(snapshot.clone());
        let limit = self.config.max_snapshots.max(1);
        while self.snapshots.len() > limit {
            self.snapshots.pop_front();
        }
        snapshot
    }

    /// 回滚到最近一个版本号相同的快照；找不到返回 false 且状态不变
    pub fn rollback(&mut self, version: u64) -> Result<bool, AgentError> {
        let Some(snapshot) = self.snapshots.iter().rev().find(|s| s.version == version).cloned() else {
            tracing::debug!(version, "No retained snapshot for rollback");
            return Ok(false);
        };
        self.restore_from(&snapshot);
        tracing::info!(version, "Rolled back agent state");
        self.auto_save()?;
        Ok(true)
    }

    fn restore_from(&mut self, snapshot: &Snapshot) {
        self.state = snapshot.state.clone();
        self.vfs.restore_state(snapshot.state.files.clone());
    }

    /// 保存当前状态；存储错误直接返回
    pub fn persist(&self) -> Result<(), AgentError> {
        self.storage.save(&self.state)?;
        Ok(())
    }

    /// 重置为空状态，清空文件与快照，并清空存储
    pub fn clear(&mut self) -> Result<(), AgentError> {
        self.state = AgentState::new();
        self.vfs.clear();
        self.snapshots.clear();
        self.storage.clear()?;
        tracing::info!("Cleared agent state");
        Ok(())
    }

    /// 订阅存储的带外变更；后端不支持时返回 None
    pub fn watch_storage(&self, callback: WatchCallback) -> Option<Subscription> {
        self.storage.watch(callback)
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn stage(&self) -> AgentStage {
        self.state.stage
    }

    pub fn files(&self) -> &FileState {
        self.vfs.files()
    }

    pub fn file(&self, path: &str) -> Option<&VirtualFile> {
        self.vfs.get(path)
    }

    pub fn vfs(&self) -> &VirtualFileSystem {
        &self.vfs
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn history(&self) -> &[PhaseResult] {
        &self.state.history
    }

    /// 当前保留的快照（旧 -> 新）
    pub fn snapshots(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("version", &self.state.version)
            .field("stage", &self.state.stage)
            .field("files", &self.vfs.len())
            .field("snapshots", &self.snapshots.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}
