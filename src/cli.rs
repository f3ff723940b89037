//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::cache::{Cache, CacheKeys};
use crate::domain::error::FutdataError;
use crate::domain::fetcher::{DataFetcher, DEFAULT_INDEX};
use crate::domain::indicator::diff::Diff;
use crate::domain::indicator::ema::Ema;
use crate::domain::indicator::{IndicatorEngine, Transform};
use crate::domain::register_key::RegisterKey;
use crate::domain::resolver::Resolver;
use crate::domain::table::Table;
use crate::domain::trading_day::TradingDay;
use crate::ports::config_port::ConfigPort;
use crate::ports::reference_port::ReferenceStore;
use crate::ports::tick_port::TickStore;

#[derive(Parser, Debug)]
#[command(name = "futdata", about = "Futures reference data and tick fetcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// What to subscribe to. Exactly one is required.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Follow the product's dominant contract
    #[arg(long)]
    pub product: Option<String>,
    /// Pin one instrument
    #[arg(long)]
    pub instrument: Option<String>,
    /// Product index
    #[arg(long)]
    pub index_of: Option<String>,
}

impl Target {
    pub fn register_key(&self, sub_dominant: bool) -> Result<RegisterKey, FutdataError> {
        match (&self.product, &self.instrument, &self.index_of) {
            (None, _, _) if sub_dominant => Err(FutdataError::invalid(
                "--sub-dominant only applies to --product",
            )),
            (Some(product), _, _) if sub_dominant => Ok(RegisterKey::sub_dominant(product)),
            (Some(product), _, _) => Ok(RegisterKey::dominant(product)),
            (None, Some(instrument), _) => Ok(RegisterKey::for_instrument(instrument)),
            (None, None, Some(product)) => Ok(RegisterKey::index(product)),
            (None, None, None) => Err(FutdataError::invalid(
                "one of --product, --instrument or --index-of is required",
            )),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct CalendarTarget {
    #[arg(long)]
    pub product: Option<String>,
    #[arg(long)]
    pub instrument: Option<String>,
}

/// Options shared by every command that reads tick data.
#[derive(Args, Debug, Clone)]
pub struct FetchOptions {
    /// Comma-separated columns, overriding [fetch] columns
    #[arg(long)]
    pub columns: Option<String>,
    /// Index column, overriding [fetch] index
    #[arg(long)]
    pub index: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a product, instrument or index to the symbol traded on a day
    Resolve {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        day: TradingDay,
        #[command(flatten)]
        target: Target,
        #[arg(long, conflicts_with_all = ["instrument", "index_of"])]
        sub_dominant: bool,
    },
    /// Print one day of tick data
    Fetch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        day: TradingDay,
        #[command(flatten)]
        target: Target,
        #[arg(long, conflicts_with_all = ["instrument", "index_of"])]
        sub_dominant: bool,
        #[command(flatten)]
        options: FetchOptions,
        /// Bypass the cache entirely
        #[arg(long)]
        no_cache: bool,
    },
    /// Print tick data of instruments over [begin, end)
    Range {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        begin: TradingDay,
        #[arg(long)]
        end: TradingDay,
        /// Comma-separated instruments
        #[arg(long)]
        symbols: String,
        #[command(flatten)]
        options: FetchOptions,
    },
    /// Previous or next trading day of a product or instrument
    Calendar {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        day: TradingDay,
        #[command(flatten)]
        target: CalendarTarget,
        /// Search forward instead of backward
        #[arg(long)]
        next: bool,
    },
    /// Exponential moving average over one day of ticks
    Ema {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        day: TradingDay,
        #[command(flatten)]
        target: Target,
        #[arg(long, conflicts_with_all = ["instrument", "index_of"])]
        sub_dominant: bool,
        #[command(flatten)]
        options: FetchOptions,
        #[arg(long)]
        period: usize,
        /// Source column
        #[arg(long)]
        use_key: String,
    },
    /// First difference over one day of ticks
    Diff {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        day: TradingDay,
        #[command(flatten)]
        target: Target,
        #[arg(long, conflicts_with_all = ["instrument", "index_of"])]
        sub_dominant: bool,
        #[command(flatten)]
        options: FetchOptions,
        /// Source column
        #[arg(long)]
        use_key: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Resolve {
            config,
            day,
            target,
            sub_dominant,
        } => run_resolve(&config, day, &target, sub_dominant),
        Command::Fetch {
            config,
            day,
            target,
            sub_dominant,
            options,
            no_cache,
        } => run_fetch(&config, day, &target, sub_dominant, &options, no_cache),
        Command::Range {
            config,
            begin,
            end,
            symbols,
            options,
        } => run_range(&config, begin, end, &symbols, &options),
        Command::Calendar {
            config,
            day,
            target,
            next,
        } => run_calendar(&config, day, &target, next),
        Command::Ema {
            config,
            day,
            target,
            sub_dominant,
            options,
            period,
            use_key,
        } => Ema::engine(period, use_key).and_then(|engine| {
            run_indicator(&config, day, &target, sub_dominant, &options, engine)
        }),
        Command::Diff {
            config,
            day,
            target,
            sub_dominant,
            options,
            use_key,
        } => Diff::engine(use_key).and_then(|engine| {
            run_indicator(&config, day, &target, sub_dominant, &options, engine)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FutdataError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Splits a comma-separated column list, dropping blanks.
pub fn parse_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// `[fetch] query_timeout_ms`; zero or absent means no deadline.
pub fn query_timeout(config: &dyn ConfigPort) -> Result<Option<Duration>, FutdataError> {
    match config.get_int("fetch", "query_timeout_ms", 0) {
        0 => Ok(None),
        ms if ms < 0 => Err(FutdataError::ConfigInvalid {
            section: "fetch".into(),
            key: "query_timeout_ms".into(),
            reason: format!("must not be negative, got {ms}"),
        }),
        ms => Ok(Some(Duration::from_millis(ms as u64))),
    }
}

/// Index column from the command line or `[fetch] index`.
pub fn index_column(config: &dyn ConfigPort, options: &FetchOptions) -> String {
    options
        .index
        .clone()
        .or_else(|| config.get_string("fetch", "index"))
        .unwrap_or_else(|| DEFAULT_INDEX.to_string())
}

fn open_stores(
    config: &dyn ConfigPort,
) -> Result<(Box<dyn ReferenceStore>, Box<dyn TickStore>), FutdataError> {
    let backend = config
        .get_string("fetch", "backend")
        .unwrap_or_else(|| "sqlite".to_string());

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::{SqliteReferenceStore, SqliteTickStore};
            Ok((
                Box::new(SqliteReferenceStore::from_config(config)?),
                Box::new(SqliteTickStore::from_config(config)?),
            ))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            use crate::adapters::postgres_adapter::{PostgresReferenceStore, PostgresTickStore};
            Ok((
                Box::new(PostgresReferenceStore::from_config(config)?),
                Box::new(PostgresTickStore::from_config(config)?),
            ))
        }
        other => Err(FutdataError::ConfigInvalid {
            section: "fetch".into(),
            key: "backend".into(),
            reason: format!("backend {other:?} is unknown or not compiled in"),
        }),
    }
}

fn open_cache(config: &dyn ConfigPort) -> Result<Cache, FutdataError> {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_cache_adapter::SqliteCacheStore;
        Ok(match SqliteCacheStore::from_config(config)? {
            Some(store) => Cache::with_store(Box::new(store)),
            None => Cache::in_memory(),
        })
    }

    #[cfg(not(feature = "sqlite"))]
    {
        if config.get_string("cache", "path").is_some() {
            warn!("[cache] path needs the sqlite feature; using a memory-only cache");
        }
        Ok(Cache::in_memory())
    }
}

/// Wires stores, cache and settings from `config` into a fetcher.
/// `columns` overrides `[fetch] columns`.
pub fn build_fetcher(
    config: &dyn ConfigPort,
    columns: Option<&str>,
) -> Result<DataFetcher, FutdataError> {
    let columns = columns
        .map(str::to_string)
        .or_else(|| config.get_string("fetch", "columns"))
        .ok_or_else(|| FutdataError::ConfigMissing {
            section: "fetch".into(),
            key: "columns".into(),
        })?;
    let columns = parse_columns(&columns);
    if columns.is_empty() {
        return Err(FutdataError::ConfigInvalid {
            section: "fetch".into(),
            key: "columns".into(),
            reason: "no columns listed".into(),
        });
    }

    let mut keys = CacheKeys::default();
    if let Some(market) = config.get_string("fetch", "market") {
        keys = keys.with_market(market);
    }
    let timeout = query_timeout(config)?;
    let (reference, ticks) = open_stores(config)?;
    let cache = Arc::new(open_cache(config)?);

    let resolver = Resolver::new(cache, reference);
    Ok(DataFetcher::new(resolver, ticks, columns)
        .with_keys(keys)
        .with_timeout(timeout))
}

fn print_table(table: &Table) {
    println!("{}", table.columns().join("\t"));
    for i in 0..table.len() {
        if let Some(row) = table.row(i) {
            let cells: Vec<String> = row.values().iter().map(|c| c.to_string()).collect();
            println!("{}", cells.join("\t"));
        }
    }
}

fn run_resolve(
    config_path: &Path,
    day: TradingDay,
    target: &Target,
    sub_dominant: bool,
) -> Result<(), FutdataError> {
    let config = load_config(config_path)?;
    let key = target.register_key(sub_dominant)?;
    // resolution never reads tick columns
    let fetcher = build_fetcher(&config, Some(DEFAULT_INDEX))?;
    match fetcher.fetch_symbol(&key, day)? {
        Some(symbol) => println!("{symbol}"),
        None => info!(%key, %day, "nothing to trade"),
    }
    Ok(())
}

fn run_fetch(
    config_path: &Path,
    day: TradingDay,
    target: &Target,
    sub_dominant: bool,
    options: &FetchOptions,
    no_cache: bool,
) -> Result<(), FutdataError> {
    let config = load_config(config_path)?;
    let key = target.register_key(sub_dominant)?;
    let fetcher = build_fetcher(&config, options.columns.as_deref())?;
    let index = index_column(&config, options);

    let Some(symbol) = fetcher.fetch_symbol(&key, day)? else {
        info!(%key, %day, "nothing to trade");
        return Ok(());
    };
    match fetcher.fetch_day_table(&symbol, day, !no_cache, &index)? {
        Some(table) => print_table(&table),
        None => info!(%symbol, %day, "no rows"),
    }
    Ok(())
}

fn run_range(
    config_path: &Path,
    begin: TradingDay,
    end: TradingDay,
    symbols: &str,
    options: &FetchOptions,
) -> Result<(), FutdataError> {
    let config = load_config(config_path)?;
    let fetcher = build_fetcher(&config, options.columns.as_deref())?;
    let index = index_column(&config, options);
    let symbols = parse_columns(symbols);
    let table = fetcher.fetch_range_table(&symbols, begin, end, &index)?;
    print_table(&table);
    Ok(())
}

fn run_calendar(
    config_path: &Path,
    day: TradingDay,
    target: &CalendarTarget,
    next: bool,
) -> Result<(), FutdataError> {
    let config = load_config(config_path)?;
    let fetcher = build_fetcher(&config, Some(DEFAULT_INDEX))?;
    let resolver = fetcher.resolver();
    let found = match (&target.product, &target.instrument, next) {
        (Some(p), _, false) => resolver.product_last_trading_day(p, day)?,
        (Some(p), _, true) => resolver.product_next_trading_day(p, day)?,
        (None, Some(i), false) => resolver.instrument_last_trading_day(i, day)?,
        (None, Some(i), true) => resolver.instrument_next_trading_day(i, day)?,
        (None, None, _) => {
            return Err(FutdataError::invalid("--product or --instrument is required"));
        }
    };
    match found {
        Some(found) => println!("{found}"),
        None => info!(%day, next, "no trading day found"),
    }
    Ok(())
}

fn run_indicator<T: Transform>(
    config_path: &Path,
    day: TradingDay,
    target: &Target,
    sub_dominant: bool,
    options: &FetchOptions,
    engine: IndicatorEngine<T>,
) -> Result<(), FutdataError> {
    // tick days repeat timestamps
    let mut engine = engine.allow_duplicate_index(true);
    let config = load_config(config_path)?;
    let key = target.register_key(sub_dominant)?;
    let fetcher = build_fetcher(&config, options.columns.as_deref())?;
    let index = index_column(&config, options);

    match fetcher.fetch_register_table(&key, day, &index)? {
        Some(table) => {
            engine.update_many(&table)?;
            print_table(engine.output());
        }
        None => warn!(%key, %day, "no data to feed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapConfig(Vec<(&'static str, &'static str, &'static str)>);

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0
                .iter()
                .find(|(s, k, _)| *s == section && *k == key)
                .map(|(_, _, v)| v.to_string())
        }
        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    #[test]
    fn parse_columns_trims_and_drops_blanks() {
        assert_eq!(
            parse_columns(" HappenTime, LastPrice ,,Volume"),
            vec!["HappenTime", "LastPrice", "Volume"]
        );
        assert!(parse_columns(" , ").is_empty());
    }

    #[test]
    fn target_maps_to_register_key() {
        let product = Target {
            product: Some("rb".into()),
            instrument: None,
            index_of: None,
        };
        assert_eq!(product.register_key(false).unwrap(), RegisterKey::dominant("rb"));
        assert_eq!(product.register_key(true).unwrap(), RegisterKey::sub_dominant("rb"));

        let index = Target {
            product: None,
            instrument: None,
            index_of: Some("rb".into()),
        };
        assert_eq!(index.register_key(false).unwrap(), RegisterKey::index("rb"));

        let none = Target {
            product: None,
            instrument: None,
            index_of: None,
        };
        assert!(none.register_key(false).is_err());
    }

    #[test]
    fn query_timeout_values() {
        assert_eq!(query_timeout(&MapConfig(vec![])).unwrap(), None);
        let cfg = MapConfig(vec![("fetch", "query_timeout_ms", "250")]);
        assert_eq!(query_timeout(&cfg).unwrap(), Some(Duration::from_millis(250)));
        let cfg = MapConfig(vec![("fetch", "query_timeout_ms", "-1")]);
        assert!(matches!(
            query_timeout(&cfg),
            Err(FutdataError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn index_column_precedence() {
        let none = FetchOptions {
            columns: None,
            index: None,
        };
        assert_eq!(index_column(&MapConfig(vec![]), &none), DEFAULT_INDEX);
        let cfg = MapConfig(vec![("fetch", "index", "time")]);
        assert_eq!(index_column(&cfg, &none), "time");
        let flag = FetchOptions {
            columns: None,
            index: Some("seq".into()),
        };
        assert_eq!(index_column(&cfg, &flag), "seq");
    }

    #[test]
    fn build_fetcher_requires_columns() {
        match build_fetcher(&MapConfig(vec![]), None) {
            Err(FutdataError::ConfigMissing { section, key }) => {
                assert_eq!(section, "fetch");
                assert_eq!(key, "columns");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn build_fetcher_rejects_unknown_backend() {
        let cfg = MapConfig(vec![("fetch", "backend", "mongo")]);
        assert!(matches!(
            build_fetcher(&cfg, Some("HappenTime")),
            Err(FutdataError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn cli_parses_resolve() {
        let cli = Cli::try_parse_from([
            "futdata", "resolve", "-c", "f.ini", "-d", "20170103", "--product", "rb",
            "--sub-dominant",
        ])
        .unwrap();
        match cli.command {
            Command::Resolve {
                day,
                target,
                sub_dominant,
                ..
            } => {
                assert_eq!(day.to_string(), "20170103");
                assert_eq!(target.product.as_deref(), Some("rb"));
                assert!(sub_dominant);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_conflicting_targets_and_bad_days() {
        assert!(Cli::try_parse_from([
            "futdata", "fetch", "-c", "f.ini", "-d", "20170103", "--product", "rb",
            "--instrument", "rb1705",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "futdata", "fetch", "-c", "f.ini", "-d", "2017-01-03", "--product", "rb",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "futdata", "resolve", "-c", "f.ini", "-d", "20170103", "--instrument", "rb1705",
            "--sub-dominant",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "futdata", "ema", "-c", "f.ini", "-d", "20170103", "--index-of", "rb",
            "--sub-dominant", "--period", "2", "--use-key", "LastPrice",
        ])
        .is_err());
    }

    #[test]
    fn sub_dominant_needs_a_product_target() {
        let target = Target {
            product: None,
            instrument: Some("rb1705".into()),
            index_of: None,
        };
        assert!(matches!(
            target.register_key(true),
            Err(FutdataError::InvalidArgument { .. })
        ));
        assert_eq!(
            target.register_key(false).unwrap(),
            RegisterKey::for_instrument("rb1705")
        );
    }
}
