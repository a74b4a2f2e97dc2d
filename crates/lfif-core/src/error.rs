//! 统一错误类型定义.
//!
//! 所有 LFIF crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// LFIF 统一错误类型
#[derive(Debug, Error)]
pub enum LfifError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 文件头魔数或块尺寸串不匹配
    #[error("文件头不匹配: {0}")]
    MagicMismatch(String),

    /// 质量参数越界 (必须在 1..=100)
    #[error("质量参数越界: {0}")]
    InvalidQuality(u8),

    /// 图像维度非法 (为零或与负载不一致)
    #[error("图像维度非法: {0}")]
    InvalidDimensions(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 已到达流末尾 (在预期位数之前遇到 EOF)
    #[error("已到达流末尾")]
    Eof,

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// LFIF 统一 Result 类型
pub type LfifResult<T> = Result<T, LfifError>;
