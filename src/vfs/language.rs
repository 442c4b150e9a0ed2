//! 扩展名 -> 语言映射
//!
//! 构造时传入，写文件时若未显式给出语言且旧版本也没有语言，才按扩展名推断。

use std::collections::HashMap;

use crate::vfs::file::extension_of;

/// 扩展名（含点，小写）到语言标签的映射
#[derive(Clone, Debug)]
pub struct LanguageMap {
    by_extension: HashMap<String, String>,
}

impl LanguageMap {
    /// 空映射：不推断任何语言
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// 追加或覆盖一条映射；扩展名可带或不带前导点
    pub fn with(mut self, extension: &str, language: impl Into<String>) -> Self {
        self.insert(extension, language);
        self
    }

    pub fn insert(&mut self, extension: &str, language: impl Into<String>) {
        let ext = extension.trim().to_lowercase();
        let ext = if ext.starts_with('.') { ext } else { format!(".{}", ext) };
        self.by_extension.insert(ext, language.into());
    }

    /// 合并额外映射（如配置文件中的 [languages]），后者覆盖前者
    pub fn extend<'a>(&mut self, extra: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (ext, lang) in extra {
            self.insert(ext, lang.clone());
        }
    }

    /// 按路径扩展名推断语言
    pub fn infer(&self, path: &str) -> Option<String> {
        let ext = extension_of(path)?;
        self.by_extension.get(&ext).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_extension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

impl Default for LanguageMap {
    fn default() -> Self {
        Self::empty()
            .with(".ts", "typescript")
            .with(".tsx", "typescript")
            .with(".js", "javascript")
            .with(".jsx", "javascript")
            .with(".mjs", "javascript")
            .with(".cjs", "javascript")
            .with(".json", "json")
            .with(".css", "css")
            .with(".scss", "scss")
            .with(".html", "html")
            .with(".md", "markdown")
            .with(".yaml", "yaml")
            .with(".yml", "yaml")
            .with(".svg", "xml")
            .with(".py", "python")
            .with(".rs", "rust")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_inference() {
        let map = LanguageMap::default();
        assert_eq!(map.infer("/src/main.tsx").as_deref(), Some("typescript"));
        assert_eq!(map.infer("/README.md").as_deref(), Some("markdown"));
        assert_eq!(map.infer("/Makefile"), None);
    }

    #[test]
    fn test_override_without_dot() {
        let mut map = LanguageMap::default();
        map.insert("ts", "ts-custom");
        assert_eq!(map.infer("/a.ts").as_deref(), Some("ts-custom"));
    }
}
