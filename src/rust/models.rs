/// Classifiers this crate knows the input contract of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    /// InceptionV3 trained on the GantMan five-class NSFW dataset.
    ///
    /// Characteristics:
    /// - Input: 299x299 RGB, values scaled to [0, 1]
    /// - Output: softmax over Drawing, Hentai, Neutral, Porn, Sexy
    InceptionV3,
}

/// Characteristics of a model's input and output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCharacteristics {
    pub input_size: u32,
    pub num_classes: usize,
}

/// Where to fetch a model from and the SHA-256 it must match
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub name: String,
    pub url: String,
    pub sha256: String,
}

/// Output order of the GantMan NSFW models.
pub const GANTMAN_LABELS: [&str; 5] = ["Drawing", "Hentai", "Neutral", "Porn", "Sexy"];

impl BuiltinModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InceptionV3 => "inception_v3",
        }
    }

    pub fn characteristics(&self) -> ModelCharacteristics {
        match self {
            Self::InceptionV3 => ModelCharacteristics {
                input_size: 299,
                num_classes: GANTMAN_LABELS.len(),
            },
        }
    }

    pub fn labels(&self) -> Vec<String> {
        match self {
            Self::InceptionV3 => GANTMAN_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inception_v3" => Some(Self::InceptionV3),
            _ => None,
        }
    }
}
