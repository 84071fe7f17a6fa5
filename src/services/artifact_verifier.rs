//! 导出产物校验 - 业务能力层
//!
//! 只看本地文件：存在、非空、文件头与扩展名一致

use std::fmt;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::ArtifactError;

/// 可识别的音频格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Webm,
    Ogg,
    Mp3,
    M4a,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Wav,
        AudioFormat::Webm,
        AudioFormat::Ogg,
        AudioFormat::Mp3,
        AudioFormat::M4a,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Webm => "webm",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let lower = extension.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == lower)
    }

    /// 文件头是否符合该格式
    pub fn matches_header(self, header: &[u8]) -> bool {
        match self {
            AudioFormat::Wav => header.starts_with(b"RIFF") && header.get(8..12) == Some(&b"WAVE"[..]),
            AudioFormat::Webm => header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
            AudioFormat::Ogg => header.starts_with(b"OggS"),
            AudioFormat::Mp3 => {
                header.starts_with(b"ID3")
                    || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
            }
            AudioFormat::M4a => header.get(4..8) == Some(&b"ftyp"[..]),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// 按扩展名识别音频格式
pub fn detect_audio_format(path: &Path) -> Result<AudioFormat, ArtifactError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    AudioFormat::from_extension(&extension).ok_or_else(|| ArtifactError::UnrecognisedFormat {
        path: path.display().to_string(),
        extension,
    })
}

/// 文件存在且非空，返回文件大小
pub async fn verify_non_empty(path: &Path) -> Result<u64, ArtifactError> {
    let metadata = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::Missing {
                path: path.display().to_string(),
            })
        }
        Err(source) => {
            return Err(ArtifactError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if metadata.len() == 0 {
        return Err(ArtifactError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(metadata.len())
}

/// 校验音频文件：非空、格式可识别、文件头与扩展名一致
pub async fn verify_audio(path: &Path) -> Result<AudioFormat, ArtifactError> {
    verify_non_empty(path).await?;
    let format = detect_audio_format(path)?;

    let io_err = |source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = fs::File::open(path).await.map_err(io_err)?;
    let mut header = [0u8; 12];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..]).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if !format.matches_header(&header[..filled]) {
        return Err(ArtifactError::CorruptHeader {
            path: path.display().to_string(),
            format: format.to_string(),
        });
    }
    Ok(format)
}
