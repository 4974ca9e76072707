//! Build mode and the optimizations it selects.

use std::fmt;
use std::str::FromStr;

/// Environment variable read once at startup to pick the build mode.
pub const MODE_ENV_VAR: &str = "NODE_ENV";

/// Build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Read the mode from the process environment.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(MODE_ENV_VAR).ok().as_deref())
    }

    /// Only the exact value `development` selects development mode.
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some("development") => Mode::Development,
            _ => Mode::Production,
        }
    }

    pub fn is_dev(self) -> bool {
        self == Mode::Development
    }

    pub fn is_prod(self) -> bool {
        self == Mode::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!(
                "unknown mode '{}', expected 'development' or 'production'",
                other
            )),
        }
    }
}

/// Optimizations applied to a build, derived from the mode alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Optimization {
    /// Move `node_modules` code into a separate vendor chunk
    pub split_chunks: bool,

    /// Minify scripts, styles and HTML
    pub minimize: bool,

    /// Live reload in the dev server
    pub hot: bool,
}

impl Optimization {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Production => Self {
                split_chunks: true,
                minimize: true,
                hot: false,
            },
            Mode::Development => Self {
                split_chunks: false,
                minimize: false,
                hot: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_development_value_selects_dev() {
        assert_eq!(Mode::from_value(Some("development")), Mode::Development);
        assert_eq!(Mode::from_value(Some("production")), Mode::Production);
        assert_eq!(Mode::from_value(Some("Development")), Mode::Production);
        assert_eq!(Mode::from_value(Some("")), Mode::Production);
        assert_eq!(Mode::from_value(None), Mode::Production);
    }

    #[test]
    fn production_splits_and_minifies() {
        let opt = Optimization::for_mode(Mode::Production);
        assert!(opt.split_chunks);
        assert!(opt.minimize);
        assert!(!opt.hot);
    }

    #[test]
    fn development_enables_hot_reload_only() {
        let opt = Optimization::for_mode(Mode::Development);
        assert!(!opt.split_chunks);
        assert!(!opt.minimize);
        assert!(opt.hot);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("dev".parse::<Mode>().unwrap(), Mode::Development);
        assert_eq!("production".parse::<Mode>().unwrap(), Mode::Production);
        assert!("staging".parse::<Mode>().is_err());
    }
}
