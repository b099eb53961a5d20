//! App modes understood by the server
//!
//! The app mode tells the server how to run a bundle. It travels in
//! `metadata.appmode` as its string name; the server also reports it back
//! as a small integer ordinal on content records.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of content a bundle holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppMode {
    Unknown,
    Shiny,
    RmdShiny,
    RmdStatic,
    Static,
    PlumberApi,
    TensorFlow,
    JupyterStatic,
    PythonApi,
    PythonDash,
    PythonStreamlit,
    PythonBokeh,
    PythonFastApi,
    QuartoShiny,
    QuartoStatic,
    PythonShiny,
    JupyterVoila,
    PythonGradio,
    PythonPanel,
}

impl AppMode {
    /// Every known mode, in ordinal order
    pub const ALL: [AppMode; 19] = [
        AppMode::Unknown,
        AppMode::Shiny,
        AppMode::RmdShiny,
        AppMode::RmdStatic,
        AppMode::Static,
        AppMode::PlumberApi,
        AppMode::TensorFlow,
        AppMode::JupyterStatic,
        AppMode::PythonApi,
        AppMode::PythonDash,
        AppMode::PythonStreamlit,
        AppMode::PythonBokeh,
        AppMode::PythonFastApi,
        AppMode::QuartoShiny,
        AppMode::QuartoStatic,
        AppMode::PythonShiny,
        AppMode::JupyterVoila,
        AppMode::PythonGradio,
        AppMode::PythonPanel,
    ];

    /// Wire name written to `metadata.appmode`
    pub fn name(self) -> &'static str {
        match self {
            AppMode::Unknown => "unknown",
            AppMode::Shiny => "shiny",
            AppMode::RmdShiny => "rmd-shiny",
            AppMode::RmdStatic => "rmd-static",
            AppMode::Static => "static",
            AppMode::PlumberApi => "api",
            AppMode::TensorFlow => "tensorflow-saved-model",
            AppMode::JupyterStatic => "jupyter-static",
            AppMode::PythonApi => "python-api",
            AppMode::PythonDash => "python-dash",
            AppMode::PythonStreamlit => "python-streamlit",
            AppMode::PythonBokeh => "python-bokeh",
            AppMode::PythonFastApi => "python-fastapi",
            AppMode::QuartoShiny => "quarto-shiny",
            AppMode::QuartoStatic => "quarto-static",
            AppMode::PythonShiny => "python-shiny",
            AppMode::JupyterVoila => "jupyter-voila",
            AppMode::PythonGradio => "python-gradio",
            AppMode::PythonPanel => "python-panel",
        }
    }

    /// Numeric identifier the server uses on content records
    pub fn ordinal(self) -> u8 {
        match self {
            AppMode::Unknown => 0,
            AppMode::Shiny => 1,
            AppMode::RmdShiny => 2,
            AppMode::RmdStatic => 3,
            AppMode::Static => 4,
            AppMode::PlumberApi => 5,
            AppMode::TensorFlow => 6,
            AppMode::JupyterStatic => 7,
            AppMode::PythonApi => 8,
            AppMode::PythonDash => 9,
            AppMode::PythonStreamlit => 10,
            AppMode::PythonBokeh => 11,
            AppMode::PythonFastApi => 12,
            AppMode::QuartoShiny => 13,
            AppMode::QuartoStatic => 14,
            AppMode::PythonShiny => 15,
            AppMode::JupyterVoila => 16,
            AppMode::PythonGradio => 17,
            AppMode::PythonPanel => 18,
        }
    }

    /// Human-readable label for summaries
    pub fn description(self) -> &'static str {
        match self {
            AppMode::Unknown => "<unknown>",
            AppMode::Shiny => "Shiny App",
            AppMode::RmdShiny => "Shiny App (RMarkdown)",
            AppMode::RmdStatic => "RMarkdown",
            AppMode::Static => "Static HTML",
            AppMode::PlumberApi => "API",
            AppMode::TensorFlow => "TensorFlow Model",
            AppMode::JupyterStatic => "Jupyter Notebook",
            AppMode::PythonApi => "Python API",
            AppMode::PythonDash => "Dash Application",
            AppMode::PythonStreamlit => "Streamlit Application",
            AppMode::PythonBokeh => "Bokeh Application",
            AppMode::PythonFastApi => "Python FastAPI",
            AppMode::QuartoShiny => "Quarto Shiny App",
            AppMode::QuartoStatic => "Quarto Document",
            AppMode::PythonShiny => "Python Shiny Application",
            AppMode::JupyterVoila => "Jupyter Voila Application",
            AppMode::PythonGradio => "Gradio Application",
            AppMode::PythonPanel => "Panel Application",
        }
    }

    /// Whether the server runs this content under a Python interpreter
    pub fn is_python(self) -> bool {
        matches!(
            self,
            AppMode::JupyterStatic
                | AppMode::PythonApi
                | AppMode::PythonDash
                | AppMode::PythonStreamlit
                | AppMode::PythonBokeh
                | AppMode::PythonFastApi
                | AppMode::PythonShiny
                | AppMode::JupyterVoila
                | AppMode::PythonGradio
                | AppMode::PythonPanel
        )
    }

    /// Look up a mode by its wire name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.name() == name)
            .ok_or_else(|| Error::UnknownAppMode(name.to_string()))
    }

    /// Look up a mode by its numeric identifier
    pub fn from_ordinal(ordinal: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.ordinal() == ordinal)
            .ok_or_else(|| Error::UnknownAppMode(ordinal.to_string()))
    }
}

impl Default for AppMode {
    fn default() -> Self {
        AppMode::Unknown
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AppMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl Serialize for AppMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for AppMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        AppMode::from_name(&name).map_err(serde::de::Error::custom)
    }
}
