//! 噪声行判定与项目符号清理

use regex::Regex;
use std::sync::LazyLock;

/// 行首的项目符号，后面必须跟正文时才会被剥离
static BULLET_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[•·▪▫▬►‣⁃○□]\s*|[*\-—–+>»]\s+)").expect("valid bullet regex")
});

/// 单独成行的项目符号
static LONE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[•·▪▫▬►‣⁃○□*\-—–+>»]+$").expect("valid marker regex"));

/// 没有后续文字的编号，如 `3.` `a)`
static BARE_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+|[a-zA-Z])[.)]$").expect("valid numbering regex"));

static SYMBOLS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\w\s]+$").expect("valid symbol regex"));

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid numeric regex"));

static SINGLE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]$").expect("valid letter regex"));

const ARTIFACTS: [&str; 5] = ["©", "®", "™", "...", "…"];

pub fn is_bullet_marker(text: &str) -> bool {
    let text = text.trim();
    if LONE_MARKER.is_match(text) || BARE_NUMBERING.is_match(text) {
        return true;
    }
    text.chars().count() <= 3 && SYMBOLS_ONLY.is_match(text)
}

/// 是否应丢弃该行：过短、纯符号、纯数字、单个字母或版权符号
pub fn is_noise(text: &str) -> bool {
    let text = text.trim();
    if text.chars().count() < 2 {
        return true;
    }
    if is_bullet_marker(text) {
        return true;
    }
    if NUMERIC.is_match(text) || SINGLE_LETTER.is_match(text) {
        return true;
    }
    ARTIFACTS.contains(&text)
}

/// 去掉行首项目符号，不会删除整行
pub fn strip_bullet(text: &str) -> String {
    let trimmed = text.trim();
    BULLET_PREFIX.replace(trimmed, "").trim().to_string()
}
