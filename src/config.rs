use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Capacity of the buffered readers used by the graph loaders.
pub const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Selects the backing of the tentative DFS forest.
///
/// Both backings satisfy the same [`DynamicForest`](crate::forest::DynamicForest)
/// contract. `Naive` walks parent pointers and costs O(depth) per query,
/// `LinkCut` keeps amortized O(log n) per operation even when contraction
/// produces very deep chains.
///
/// The link-cut backing serializes `root`, `children`, `link` and `cut` of
/// every worker on a single mutex around its splay arena; only `is_root` and
/// `parent` avoid it. With many threads on shallow forests `Naive` usually
/// scales better, `LinkCut` wins once trees get deep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForestKind {
    Naive,
    #[default]
    #[value(name = "linkcut")]
    LinkCut,
}

/// Configuration for the concurrent SCC search.
///
/// # Fields
///
/// * `thread_num` - Number of worker threads, `0` lets rayon pick one per CPU
/// * `forest` - Backing of the tentative DFS forest
/// * `shuffle_seeds` - Seed the roots in pseudo-random order when no initial vertices are given
/// * `seed` - Fixed seed for the shuffle, mostly useful to replay a run
/// * `check_post_condition` - Verify the graph post-condition after a successful search
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SccConfig {
    pub thread_num: usize,
    pub forest: ForestKind,
    pub shuffle_seeds: bool,
    pub seed: Option<u64>,
    pub check_post_condition: bool,
}

impl SccConfig {
    /// Loads a configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Parses a configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod test_config {
    use crate::config::{ForestKind, SccConfig};

    #[test]
    fn test_yaml_defaults() {
        let config = SccConfig::from_yaml_str("thread_num: 3\n").unwrap();
        assert_eq!(config.thread_num, 3);
        assert_eq!(config.forest, ForestKind::LinkCut);
        assert!(!config.shuffle_seeds);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_yaml_forest_kind() {
        let yaml = "forest: naive\nshuffle_seeds: true\nseed: 42\ncheck_post_condition: true\n";
        let config = SccConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.forest, ForestKind::Naive);
        assert!(config.shuffle_seeds);
        assert_eq!(config.seed, Some(42));
        assert!(config.check_post_condition);

        assert!(SccConfig::from_yaml_str("forest: splay\n").is_err());
    }
}
