//! DRM 信息集合.
//!
//! `uuid -> [pssh]` 多值映射, 只追加. 同一 uuid 下字节完全相同的 pssh 视为重复.

use std::collections::BTreeMap;

use liu_core::DrmInfo;

/// 已知 DRM 信息集合
#[derive(Debug, Default, Clone)]
pub struct DrmInfoSet {
    entries: BTreeMap<String, Vec<Vec<u8>>>,
}

impl DrmInfoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一批 DRM 信息, 返回其中此前未出现过的条目
    pub fn merge(&mut self, infos: &[DrmInfo]) -> Vec<DrmInfo> {
        let mut added = Vec::new();
        for info in infos {
            let known = self.entries.entry(info.uuid.clone()).or_default();
            if known.iter().any(|p| p == &info.pssh) {
                continue;
            }
            known.push(info.pssh.clone());
            added.push(info.clone());
        }
        added
    }

    /// 展开为 `(uuid, pssh)` 列表
    pub fn snapshot(&self) -> Vec<DrmInfo> {
        self.entries
            .iter()
            .flat_map(|(uuid, psshs)| psshs.iter().map(move |p| DrmInfo::new(uuid.clone(), p.clone())))
            .collect()
    }

    /// 条目总数
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
