// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 叠加层画面输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbaImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use crate::FromUrlWithScheme;
use crate::renderer::OverlayKind;

mod latest;
pub use self::latest::LatestSurface;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 渲染完成的画面交给输出端
///
/// 渲染循环在自己的任务中同步调用 `present`，实现不应长时间阻塞。
pub trait SurfaceSink: Send + Sync {
  fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError>;

  /// 叠加层被关闭时调用
  fn withdraw(&self, _kind: OverlayKind) {}
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl SurfaceSink for OutputWrapper {
  #[allow(unused_variables)]
  fn present(&self, kind: OverlayKind, surface: &RgbaImage) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.present(kind, surface),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.present(kind, surface),
    }
  }

  #[allow(unused_variables)]
  fn withdraw(&self, kind: OverlayKind) {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.withdraw(kind),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.withdraw(kind),
    }
  }
}

/// 将路径部分还原为本地路径
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
fn url_path(url: &Url) -> String {
  urlencoding::decode(url.path())
    .map(|path| path.into_owned())
    .unwrap_or_else(|_| url.path().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }

  #[cfg(feature = "directory_record")]
  #[test]
  fn folder_scheme_selects_directory_record() {
    let url = Url::parse("folder:///tmp/overlay").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::DirectoryRecordOutput(_))
    ));
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn image_scheme_selects_single_file() {
    let url = Url::parse("image:///tmp/overlay.png").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::SaveImageFileOutput(_))
    ));
  }
}
