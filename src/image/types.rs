//! Core types for image generation.

use crate::config::{ModelProviderConfig, MODELS};
use crate::error::{ImageGateError, Result};
use crate::logging::LogSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageSize {
    /// 1024x1024, the fallback size everywhere.
    pub const SQUARE_1024: Self = Self::new(1024, 1024);

    /// Creates a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parses `WIDTHxHEIGHT`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || ImageGateError::InvalidImageSize(s.to_string());
        let (w, h) = s.trim().split_once('x').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self::new(width, height))
    }

    /// Width divided by height.
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height.max(1))
    }

    /// Returns true if width equals height.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Returns true if wider than tall.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Returns true if taller than wide.
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Total pixel count.
    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = ImageGateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Common aspect ratios for image generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 21:9 ultrawide aspect ratio.
    #[serde(rename = "21:9")]
    Ultrawide,
    /// 16:9 landscape (widescreen) aspect ratio.
    #[serde(rename = "16:9")]
    Landscape,
    /// 4:3 standard landscape aspect ratio.
    #[serde(rename = "4:3")]
    Standard,
    /// 3:2 photo aspect ratio.
    #[serde(rename = "3:2")]
    ThreeTwo,
    /// 1:1 square aspect ratio.
    #[serde(rename = "1:1")]
    Square,
    /// 9:16 portrait (tall) aspect ratio.
    #[serde(rename = "9:16")]
    Portrait,
}

const TARGET_PIXELS: f64 = 1024.0 * 1024.0;
const DIMENSION_STEP: u32 = 16;
const MIN_DIMENSION: u32 = 512;
const MAX_DIMENSION: u32 = 2048;

impl AspectRatio {
    /// Every preset, widest first.
    pub const ALL: [Self; 6] = [
        Self::Ultrawide,
        Self::Landscape,
        Self::Standard,
        Self::ThreeTwo,
        Self::Square,
        Self::Portrait,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrawide => "21:9",
            Self::Landscape => "16:9",
            Self::Standard => "4:3",
            Self::ThreeTwo => "3:2",
            Self::Square => "1:1",
            Self::Portrait => "9:16",
        }
    }

    /// Width divided by height.
    pub fn ratio(&self) -> f64 {
        match self {
            Self::Ultrawide => 21.0 / 9.0,
            Self::Landscape => 16.0 / 9.0,
            Self::Standard => 4.0 / 3.0,
            Self::ThreeTwo => 3.0 / 2.0,
            Self::Square => 1.0,
            Self::Portrait => 9.0 / 16.0,
        }
    }

    /// Dimensions near one megapixel with this ratio, each side a multiple
    /// of 16 within 512..=2048.
    pub fn dimensions(&self) -> ImageSize {
        let r = self.ratio();
        let (w, h) = if r >= 1.0 {
            let w = (TARGET_PIXELS * r).sqrt().round();
            (w, (w / r).round())
        } else {
            let h = (TARGET_PIXELS / r).sqrt().round();
            ((h * r).round(), h)
        };
        ImageSize::new(snap(w), snap(h))
    }
}

fn snap(side: f64) -> u32 {
    let side = side as u32;
    (side - side % DIMENSION_STEP).clamp(MIN_DIMENSION, MAX_DIMENSION)
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ImageGateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ar| ar.as_str() == s.trim())
            .ok_or_else(|| ImageGateError::InvalidRequest(format!("unknown aspect ratio {s:?}")))
    }
}

/// Provider ids, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// Zhipu AI CogView.
    #[serde(rename = "cogview")]
    Cogview,
    /// OpenAI gpt-image-1 / DALL·E.
    #[serde(rename = "openai")]
    OpenAi,
    /// Alibaba Cloud Tongyi Wanx.
    #[serde(rename = "wanx2")]
    Wanx,
    /// Baidu Qianfan.
    #[serde(rename = "qianfan")]
    Qianfan,
    /// Volcengine Doubao.
    #[serde(rename = "doubaoimg")]
    Doubao,
    /// MiniMax.
    #[serde(rename = "minimax")]
    Minimax,
}

impl ProviderId {
    /// Every provider, in catalog order.
    pub const ALL: [Self; 6] = [
        Self::Cogview,
        Self::OpenAi,
        Self::Wanx,
        Self::Qianfan,
        Self::Doubao,
        Self::Minimax,
    ];

    /// Catalog id.
    pub fn as_str(&self) -> &'static str {
        self.config().value
    }

    /// Static configuration for this provider.
    pub fn config(&self) -> &'static ModelProviderConfig {
        let index = match self {
            Self::Cogview => 0,
            Self::OpenAi => 1,
            Self::Wanx => 2,
            Self::Qianfan => 3,
            Self::Doubao => 4,
            Self::Minimax => 5,
        };
        &MODELS[index]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ImageGateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ImageGateError::UnsupportedModel(s.to_string()))
    }
}

/// Parameters for one generation call.
#[derive(Clone)]
pub struct GenerateImageParams {
    /// Text prompt.
    pub prompt: String,
    /// Concrete model id.
    pub model: String,
    /// `WIDTHxHEIGHT`.
    pub image_size: String,
    /// Negative prompt, for models that accept one.
    pub negative_prompt: Option<String>,
    /// Destination for structured log entries.
    pub sink: Arc<dyn LogSink>,
}

impl GenerateImageParams {
    /// Creates parameters without a negative prompt.
    pub fn new(
        prompt: impl Into<String>,
        model: impl Into<String>,
        image_size: impl Into<String>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            image_size: image_size.into(),
            negative_prompt: None,
            sink,
        }
    }

    /// Sets the negative prompt; empty strings clear it.
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        let negative = negative.into();
        self.negative_prompt = (!negative.is_empty()).then_some(negative);
        self
    }
}

impl fmt::Debug for GenerateImageParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateImageParams")
            .field("prompt", &self.prompt)
            .field("model", &self.model)
            .field("image_size", &self.image_size)
            .field("negative_prompt", &self.negative_prompt)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_parse() {
        assert_eq!(ImageSize::parse("1792x1024").unwrap(), ImageSize::new(1792, 1024));
        assert!(ImageSize::parse("1024").is_err());
        assert!(ImageSize::parse("0x512").is_err());
        assert!(ImageSize::parse("axb").is_err());
    }

    #[test]
    fn test_image_size_display() {
        assert_eq!(ImageSize::new(720, 1280).to_string(), "720x1280");
    }

    #[test]
    fn test_orientation() {
        assert!(ImageSize::SQUARE_1024.is_square());
        assert!(ImageSize::new(1536, 1024).is_landscape());
        assert!(ImageSize::new(1024, 1536).is_portrait());
    }

    #[test]
    fn test_aspect_ratio_dimensions() {
        assert_eq!(AspectRatio::Square.dimensions(), ImageSize::new(1024, 1024));
        assert_eq!(AspectRatio::Landscape.dimensions(), ImageSize::new(1360, 768));
        assert_eq!(AspectRatio::Portrait.dimensions(), ImageSize::new(768, 1360));
    }

    #[test]
    fn test_aspect_ratio_dimensions_within_bounds() {
        for ar in AspectRatio::ALL {
            let size = ar.dimensions();
            assert_eq!(size.width % 16, 0, "{ar}");
            assert_eq!(size.height % 16, 0, "{ar}");
            assert!((512..=2048).contains(&size.width), "{ar}");
            assert!((512..=2048).contains(&size.height), "{ar}");
        }
    }

    #[test]
    fn test_aspect_ratio_from_str() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert!("5:4".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_aspect_ratio_serialization() {
        let json = serde_json::to_string(&AspectRatio::Ultrawide).unwrap();
        assert_eq!(json, "\"21:9\"");
    }

    #[test]
    fn test_provider_id_matches_catalog() {
        for (index, id) in ProviderId::ALL.into_iter().enumerate() {
            assert_eq!(MODELS[index].value, id.as_str());
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
    }

    #[test]
    fn test_negative_prompt_empty_clears() {
        let params = GenerateImageParams::new(
            "p",
            "wanx2.1-t2i-turbo",
            "1024x1024",
            Arc::new(crate::logging::NullSink),
        )
        .with_negative_prompt("");
        assert!(params.negative_prompt.is_none());
    }
}
