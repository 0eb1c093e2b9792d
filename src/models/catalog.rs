//! The model catalog
//!
//! Static list of the ggml whisper models voxkey knows how to fetch.
//! Ids are short and stable; the plain `tiny` and `base` ids are the
//! English-only files, with `-multi` variants for the multilingual
//! ones. Checksums are the upstream SHA-1s published alongside the
//! ggml conversions.

use crate::config::Config;
use crate::error::Result;
use std::path::PathBuf;

/// One downloadable model
pub struct ModelSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub filename: &'static str,
    pub url: &'static str,
    pub sha1: &'static str,
    pub size_mb: u32,
    /// Approximate resident memory while loaded
    pub ram_mb: u32,
    pub multilingual: bool,
    pub description: &'static str,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        id: "tiny",
        display_name: "Tiny (English)",
        filename: "ggml-tiny.en.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.en.bin",
        sha1: "c78c86eb1a8faa21b369bcd33207cc90d64ae9df",
        size_mb: 75,
        ram_mb: 273,
        multilingual: false,
        description: "Fastest, lowest accuracy",
    },
    ModelSpec {
        id: "tiny-multi",
        display_name: "Tiny (multilingual)",
        filename: "ggml-tiny.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
        sha1: "bd577a113a864445d4c299885e0cb97d4ba92b5f",
        size_mb: 75,
        ram_mb: 273,
        multilingual: true,
        description: "Fastest, lowest accuracy",
    },
    ModelSpec {
        id: "base",
        display_name: "Base (English)",
        filename: "ggml-base.en.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin",
        sha1: "137c40403d78fd54d454da0f9bd998f78703390c",
        size_mb: 142,
        ram_mb: 388,
        multilingual: false,
        description: "Fast, fine for clear speech",
    },
    ModelSpec {
        id: "base-multi",
        display_name: "Base (multilingual)",
        filename: "ggml-base.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
        sha1: "465707469ff3a37a2b9b8d8f89f2f99de7299dac",
        size_mb: 142,
        ram_mb: 388,
        multilingual: true,
        description: "Fast, fine for clear speech",
    },
    ModelSpec {
        id: "small",
        display_name: "Small",
        filename: "ggml-small.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
        sha1: "55356645c2b361a969dfd0ef2c5a50d530afd8d5",
        size_mb: 466,
        ram_mb: 852,
        multilingual: true,
        description: "Good balance (default)",
    },
    ModelSpec {
        id: "medium",
        display_name: "Medium",
        filename: "ggml-medium.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin",
        sha1: "fd9727b6e1217c2f614027e6336b9ee0d4567b8a",
        size_mb: 1500,
        ram_mb: 2100,
        multilingual: true,
        description: "High accuracy, slower",
    },
    ModelSpec {
        id: "large-v3",
        display_name: "Large v3",
        filename: "ggml-large-v3.bin",
        url: "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3.bin",
        sha1: "ad82bf6a9043ceed055076d0c39101a3aaa8c4e3",
        size_mb: 3100,
        ram_mb: 3900,
        multilingual: true,
        description: "Best accuracy, needs a strong machine",
    },
];

pub const DEFAULT_MODEL_ID: &str = "small";

/// Look up a model by catalog id
pub fn find(id: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.id == id)
}

pub fn all() -> &'static [ModelSpec] {
    MODELS
}

/// Comma-separated id list for error messages
pub fn id_list() -> String {
    MODELS
        .iter()
        .map(|m| m.id)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ModelSpec {
    /// Where this model lives once installed
    pub fn path(&self) -> Result<PathBuf> {
        Ok(Config::models_dir()?.join(self.filename))
    }
}
