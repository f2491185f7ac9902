// =============================================================================
// Configuration — CLI surface with environment fallbacks
// =============================================================================
//
// Precedence: CLI flag, then environment variable, then built-in default.
// Everything is validated here so the pipeline starts from a known-good
// `AppConfig`; a bad flag or missing token is a single-line fatal error.
//
// Recognised environment variables (all optional fallbacks):
//   MARKET_DATA_PROVIDER   finnhub | polygon (default finnhub)
//   FINNHUB_TOKEN / FINNHUB_WS_URL
//   POLYGON_API_KEY / POLYGON_WS_URL
//   SYMBOLS                comma-separated list

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::market_data::{finnhub, polygon};
use crate::stats::WindowConfig;
use crate::types::Symbol;

const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

#[derive(Debug, Parser)]
#[command(
    name = "tickfan",
    version,
    about = "Real-time market data fan-out, rolling statistics and indicator signals"
)]
pub struct Cli {
    /// Provider API token. Falls back to FINNHUB_TOKEN / POLYGON_API_KEY.
    #[arg(long)]
    pub token: Option<String>,

    /// Symbols to subscribe, comma-separated. Falls back to SYMBOLS.
    #[arg(long, value_delimiter = ',')]
    pub symbol: Vec<String>,

    /// Provider WebSocket URL override.
    #[arg(long)]
    pub url: Option<String>,

    /// Recent trades retained in the view model.
    #[arg(long, default_value_t = crate::view_model::DEFAULT_MAX_TRADES)]
    pub max_trades: usize,

    /// Rolling statistics window size (event count).
    #[arg(long, default_value_t = 100)]
    pub window_size: usize,

    /// Enable the extended indicator set (Bollinger, VWAP, volatility).
    #[arg(long)]
    pub enhanced_metrics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Finnhub,
    Polygon,
}

impl ProviderKind {
    fn token_var(self) -> &'static str {
        match self {
            Self::Finnhub => "FINNHUB_TOKEN",
            Self::Polygon => "POLYGON_API_KEY",
        }
    }

    fn url_var(self) -> &'static str {
        match self {
            Self::Finnhub => "FINNHUB_WS_URL",
            Self::Polygon => "POLYGON_WS_URL",
        }
    }

    fn default_url(self) -> &'static str {
        match self {
            Self::Finnhub => finnhub::DEFAULT_WS_URL,
            Self::Polygon => polygon::DEFAULT_WS_URL,
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "polygon" => Ok(Self::Polygon),
            other => Err(format!(
                "unknown provider {other:?} (expected finnhub or polygon)"
            )),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finnhub => write!(f, "finnhub"),
            Self::Polygon => write!(f, "polygon"),
        }
    }
}

/// Validated runtime configuration the composition root wires from.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub token: String,
    pub ws_url: String,
    pub symbols: Vec<Symbol>,
    pub max_trades: usize,
    pub window: WindowConfig,
    pub enhanced_metrics: bool,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        Self::resolve(cli, |key| std::env::var(key).ok())
    }

    /// Merge CLI flags with an environment lookup. Split out so tests can
    /// inject the environment.
    fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = match env("MARKET_DATA_PROVIDER") {
            Some(raw) => raw
                .parse::<ProviderKind>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("MARKET_DATA_PROVIDER")?,
            None => ProviderKind::Finnhub,
        };

        let token = cli
            .token
            .or_else(|| env(provider.token_var()))
            .with_context(|| {
                format!("no API token: pass --token or set {}", provider.token_var())
            })?;

        let ws_url = cli
            .url
            .or_else(|| env(provider.url_var()))
            .unwrap_or_else(|| provider.default_url().to_string());

        let raw_symbols: Vec<String> = if !cli.symbol.is_empty() {
            cli.symbol
        } else if let Some(env_symbols) = env("SYMBOLS") {
            env_symbols.split(',').map(str::to_string).collect()
        } else {
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        };

        let mut symbols = Vec::with_capacity(raw_symbols.len());
        for raw in &raw_symbols {
            if raw.trim().is_empty() {
                continue; // tolerate trailing commas
            }
            symbols.push(Symbol::new(raw).with_context(|| format!("bad symbol {raw:?}"))?);
        }
        if symbols.is_empty() {
            bail!("no symbols to subscribe");
        }

        let window = WindowConfig::event_based(cli.window_size)
            .context("--window-size must be > 0")?;

        if cli.max_trades == 0 {
            bail!("--max-trades must be > 0");
        }

        Ok(Self {
            provider,
            token,
            ws_url,
            symbols,
            max_trades: cli.max_trades,
            window,
            enhanced_metrics: cli.enhanced_metrics,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tickfan").chain(args.iter().copied())).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn cli_token_and_symbols_win() {
        let config = AppConfig::resolve(
            cli(&["--token", "t0k3n", "--symbol", "aapl,msft"]),
            no_env,
        )
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Finnhub);
        assert_eq!(config.token, "t0k3n");
        let names: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT"]);
        assert_eq!(config.ws_url, finnhub::DEFAULT_WS_URL);
    }

    #[test]
    fn env_fallbacks_fill_gaps() {
        let env = |key: &str| match key {
            "MARKET_DATA_PROVIDER" => Some("polygon".to_string()),
            "POLYGON_API_KEY" => Some("pk".to_string()),
            "POLYGON_WS_URL" => Some("wss://example.test/stocks".to_string()),
            "SYMBOLS" => Some("TSLA,NVDA".to_string()),
            _ => None,
        };
        let config = AppConfig::resolve(cli(&[]), env).unwrap();
        assert_eq!(config.provider, ProviderKind::Polygon);
        assert_eq!(config.token, "pk");
        assert_eq!(config.ws_url, "wss://example.test/stocks");
        let names: Vec<&str> = config.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["TSLA", "NVDA"]);
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = AppConfig::resolve(cli(&[]), no_env).unwrap_err();
        assert!(err.to_string().contains("FINNHUB_TOKEN"));
    }

    #[test]
    fn zero_window_size_is_rejected() {
        assert!(AppConfig::resolve(
            cli(&["--token", "t", "--window-size", "0"]),
            no_env
        )
        .is_err());
    }

    #[test]
    fn zero_max_trades_is_rejected() {
        assert!(AppConfig::resolve(
            cli(&["--token", "t", "--max-trades", "0"]),
            no_env
        )
        .is_err());
    }

    #[test]
    fn default_symbols_apply_when_nothing_is_given() {
        let config = AppConfig::resolve(cli(&["--token", "t"]), no_env).unwrap();
        assert_eq!(config.symbols.len(), DEFAULT_SYMBOLS.len());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let env = |key: &str| match key {
            "MARKET_DATA_PROVIDER" => Some("bloomberg".to_string()),
            _ => None,
        };
        assert!(AppConfig::resolve(cli(&["--token", "t"]), env).is_err());
    }

    #[test]
    fn trailing_commas_in_symbols_are_tolerated() {
        let config =
            AppConfig::resolve(cli(&["--token", "t", "--symbol", "aapl,"]), no_env).unwrap();
        assert_eq!(config.symbols.len(), 1);
    }
}
