/*!
 * Per-content-type settings
 *
 * Content types differ only in a few static fields, so they are rows in a
 * table rather than separate code paths.
 */

use rsconnect_core_manifest::AppMode;
use std::fmt;
use std::str::FromStr;

use crate::error::RsconnectError;

/// Content type selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Api,
    FastApi,
    Dash,
    Streamlit,
    Bokeh,
    Shiny,
    Gradio,
    Panel,
    Voila,
    Notebook,
    Html,
    TensorFlow,
}

/// How the entrypoint is located when none is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrypointPolicy {
    /// Python module, written as `module` or `module:object`
    PythonModule,
    /// `index.html`, else the only HTML file
    Html,
    /// The only notebook in the directory
    Notebook,
    /// The server needs no entrypoint
    None,
}

/// One row of the content type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    pub kind: ContentKind,
    pub app_mode: AppMode,
    pub entrypoint: EntrypointPolicy,
    /// A dependency file is expected alongside the content
    pub requires_environment: bool,
    pub content_category: Option<&'static str>,
}

const fn row(
    kind: ContentKind,
    app_mode: AppMode,
    entrypoint: EntrypointPolicy,
    requires_environment: bool,
) -> AppConfig {
    AppConfig {
        kind,
        app_mode,
        entrypoint,
        requires_environment,
        content_category: None,
    }
}

static APP_CONFIGS: [AppConfig; 12] = [
    row(ContentKind::Api, AppMode::PythonApi, EntrypointPolicy::PythonModule, true),
    row(ContentKind::FastApi, AppMode::PythonFastApi, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Dash, AppMode::PythonDash, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Streamlit, AppMode::PythonStreamlit, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Bokeh, AppMode::PythonBokeh, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Shiny, AppMode::PythonShiny, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Gradio, AppMode::PythonGradio, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Panel, AppMode::PythonPanel, EntrypointPolicy::PythonModule, true),
    row(ContentKind::Voila, AppMode::JupyterVoila, EntrypointPolicy::Notebook, true),
    row(ContentKind::Notebook, AppMode::JupyterStatic, EntrypointPolicy::Notebook, true),
    AppConfig {
        content_category: Some("site"),
        ..row(ContentKind::Html, AppMode::Static, EntrypointPolicy::Html, false)
    },
    row(ContentKind::TensorFlow, AppMode::TensorFlow, EntrypointPolicy::None, false),
];

impl AppConfig {
    /// Table lookup for a content kind
    pub fn for_kind(kind: ContentKind) -> &'static AppConfig {
        APP_CONFIGS
            .iter()
            .find(|config| config.kind == kind)
            .unwrap_or(&APP_CONFIGS[0])
    }

    pub fn all() -> &'static [AppConfig] {
        &APP_CONFIGS
    }
}

impl ContentKind {
    pub fn name(self) -> &'static str {
        match self {
            ContentKind::Api => "api",
            ContentKind::FastApi => "fastapi",
            ContentKind::Dash => "dash",
            ContentKind::Streamlit => "streamlit",
            ContentKind::Bokeh => "bokeh",
            ContentKind::Shiny => "shiny",
            ContentKind::Gradio => "gradio",
            ContentKind::Panel => "panel",
            ContentKind::Voila => "voila",
            ContentKind::Notebook => "notebook",
            ContentKind::Html => "html",
            ContentKind::TensorFlow => "tensorflow",
        }
    }

    pub fn config(self) -> &'static AppConfig {
        AppConfig::for_kind(self)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentKind {
    type Err = RsconnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        APP_CONFIGS
            .iter()
            .map(|config| config.kind)
            .find(|kind| kind.name() == s)
            .ok_or_else(|| RsconnectError::Config(format!("Unknown content type: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_row() {
        for config in AppConfig::all() {
            assert_eq!(AppConfig::for_kind(config.kind).kind, config.kind);
            assert_eq!(config.kind.name().parse::<ContentKind>().unwrap(), config.kind);
        }
    }

    #[test]
    fn test_table_values() {
        let html = ContentKind::Html.config();
        assert_eq!(html.app_mode, AppMode::Static);
        assert_eq!(html.entrypoint, EntrypointPolicy::Html);
        assert!(!html.requires_environment);
        assert_eq!(html.content_category, Some("site"));

        let fastapi = ContentKind::FastApi.config();
        assert_eq!(fastapi.app_mode, AppMode::PythonFastApi);
        assert!(fastapi.requires_environment);
    }

    #[test]
    fn test_python_kinds_map_to_python_modes() {
        for config in AppConfig::all() {
            assert_eq!(
                config.requires_environment,
                config.app_mode.is_python(),
                "{}",
                config.kind
            );
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert!("flask".parse::<ContentKind>().is_err());
    }
}
