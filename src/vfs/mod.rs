//! 虚拟文件层：只存在于内存的文件、批量变更、语言推断与路径匹配

pub mod file;
pub mod language;
pub mod pattern;
pub mod store;

pub use file::{extension_of, ChangeOp, FileChange, FileState, VirtualFile};
pub use language::LanguageMap;
pub use pattern::FilePattern;
pub use store::VirtualFileSystem;
