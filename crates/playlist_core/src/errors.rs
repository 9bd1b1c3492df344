use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("分类记录无效: {0}")]
    InvalidCategory(String),
    #[error("网络请求失败: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API响应错误(status={status}, message={message})")]
    Api { status: u16, message: String },
    #[error("响应不是有效的JSON: {0}")]
    InvalidJson(String),
    #[error("读取文件失败: {0}")]
    Io(#[from] io::Error),
    #[error("CSV写入失败: {0}")]
    Csv(#[from] csv::Error),
    #[error("编码转换失败: {0}")]
    Encoding(String),
    #[error("授权失败: {0}")]
    Auth(String),
    #[error("配置无效: {0}")]
    Config(String),
    #[error("未知错误: {0}")]
    Other(String),
}

impl PlaylistError {
    /// Authentication and quota failures surface as 401/403 from the API.
    pub fn is_auth_or_quota(&self) -> bool {
        matches!(self, PlaylistError::Api { status: 401 | 403, .. })
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("播放列表导出失败: {0}")]
    Core(#[from] PlaylistError),
    #[error("执行业务流程失败: {0}")]
    Context(String),
}

impl ExportError {
    pub fn context<T: Into<String>>(self, message: T) -> Self {
        let message = message.into();
        match self {
            ExportError::Core(err) => ExportError::Context(format!("{message}: {err}")),
            ExportError::Context(existing) => {
                ExportError::Context(format!("{message}: {existing}"))
            }
        }
    }
}
