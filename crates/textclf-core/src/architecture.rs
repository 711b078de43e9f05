use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tch::nn;

use crate::bilstm_conv::BiLstmConv;
use crate::cnn_text::CnnText;
use crate::config::ModelConfig;
use crate::error::{CoreError, Result};
use crate::vdcnn::Vdcnn;

/// The model architectures the trainer can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "BiLSTMConv")]
    BiLstmConv,
    #[serde(rename = "CNN_Text_Model")]
    CnnText,
    #[serde(rename = "VDCNN")]
    Vdcnn,
}

impl Architecture {
    pub const ALL: [Architecture; 3] = [Self::BiLstmConv, Self::CnnText, Self::Vdcnn];

    /// Name used on the command line, in run directories and checkpoint files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BiLstmConv => "BiLSTMConv",
            Self::CnnText => "CNN_Text_Model",
            Self::Vdcnn => "VDCNN",
        }
    }

    pub fn checkpoint_file_name(&self) -> String {
        format!("{}.safetensors", self.name())
    }

    /// Registers the architecture's variables under `vs` and returns the model.
    pub fn build(&self, vs: &nn::Path, config: &ModelConfig) -> Result<Box<dyn nn::ModuleT>> {
        let model: Box<dyn nn::ModuleT> = match self {
            Self::BiLstmConv => Box::new(BiLstmConv::new(vs, config)),
            Self::CnnText => Box::new(CnnText::new(vs, config)),
            Self::Vdcnn => Box::new(Vdcnn::new(vs, config)?),
        };
        Ok(model)
    }
}

impl FromStr for Architecture {
    type Err = CoreError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.name() == name)
            .ok_or_else(|| CoreError::UnknownArchitecture {
                name: name.to_string(),
                known: Self::ALL.map(|arch| arch.name()).join(", "),
            })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
