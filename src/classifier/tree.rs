use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::HeadingClassifier;
use crate::parser::{FeatureVector, Label};
use crate::utils::{DocsiftError, DocsiftResult};

/// 导出为 JSON 的决策树节点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        label: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeFile {
    nodes: Vec<TreeNode>,
}

/// 预训练决策树：`feature <= threshold` 走左子树
#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<Option<Label>>,
}

impl DecisionTreeClassifier {
    pub fn load(path: &Path) -> DocsiftResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let classifier = Self::from_json(&content)?;
        info!("标题分类模型加载成功: {} ({} 个节点)", path.display(), classifier.nodes.len());
        Ok(classifier)
    }

    pub fn from_json(content: &str) -> DocsiftResult<Self> {
        let file: TreeFile = serde_json::from_str(content)?;
        Self::new(file.nodes)
    }

    /// 校验节点引用、特征下标和叶子标签
    pub fn new(nodes: Vec<TreeNode>) -> DocsiftResult<Self> {
        if nodes.is_empty() {
            return Err(DocsiftError::ModelUnavailable("决策树为空"));
        }
        let width = FeatureVector::NAMES.len();
        let mut leaves = Vec::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, left, right, .. } => {
                    if *feature >= width || *left <= i || *right <= i || *left >= nodes.len() || *right >= nodes.len() {
                        return Err(DocsiftError::InvalidInput(format!("决策树节点 {} 无效", i)));
                    }
                    leaves.push(None);
                }
                TreeNode::Leaf { label } => {
                    let label = Label::parse(label)
                        .ok_or_else(|| DocsiftError::InvalidInput(format!("未知标签: {}", label)))?;
                    leaves.push(Some(label));
                }
            }
        }
        Ok(Self { nodes, leaves })
    }

    fn predict_one(&self, features: &[f32; 10]) -> Label {
        let mut index = 0;
        loop {
            if let Some(label) = self.leaves[index] {
                return label;
            }
            index = match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    }
                }
                TreeNode::Leaf { .. } => return Label::None,
            };
        }
    }
}

impl HeadingClassifier for DecisionTreeClassifier {
    fn predict(&self, rows: &[FeatureVector]) -> Vec<Label> {
        rows.iter().map(|f| self.predict_one(&f.to_array())).collect()
    }
}
