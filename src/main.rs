mod cli;
mod lib;
mod load;

use anyhow::{anyhow, ensure, Context, Result};
use chrono::Utc;
use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use std::{
    fs,
    io::{self, Read},
    path::Path,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{
    export,
    notify::{self, Console, Notifier, Telegram},
    summary::Summary,
    table::Table,
};
use lib::{
    fetch::{FetchPolicy, LedgerFetcher, StatementSource},
    mask::MaskStyle,
    raffle::{self, Dice, Entropy, Selection},
    window::TimeWindow,
};
use load::{config::Config, error, monobank::Monobank, parse, trigger};

fn app() -> App<'static, 'static> {
    let config = Arg::with_name("config")
        .long("config")
        .short("c")
        .takes_value(true)
        .value_name("PATH")
        .help("TOML configuration (default: $JARRAFFLE_CONFIG, then jarraffle.toml)");
    App::new("jarraffle")
        .version(crate_version!())
        .about("Donation-weighted raffle over a Monobank jar")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("draw")
                .about("Fetch the jar statement and draw a winner")
                .arg(config.clone())
                .arg(
                    Arg::with_name("range")
                        .long("range")
                        .short("r")
                        .takes_value(true)
                        .value_name("RANGE")
                        .help("e.g. '2022-Dec-01 .. 2023-Jan-01 12:00' or '@1669845600 ..'"),
                )
                .arg(
                    Arg::with_name("span")
                        .long("span")
                        .takes_value(true)
                        .value_name("SPAN")
                        .help("initial window span, e.g. '12h' or '1d'"),
                )
                .arg(
                    Arg::with_name("chat")
                        .long("chat")
                        .takes_value(true)
                        .value_name("ID")
                        .help("Telegram chat to report to"),
                )
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("report to the terminal even if a chat is given"),
                )
                .arg(
                    Arg::with_name("out")
                        .long("out")
                        .short("o")
                        .takes_value(true)
                        .value_name("DIR")
                        .help("write the exports here when reporting to the terminal"),
                ),
        )
        .subcommand(
            SubCommand::with_name("webhook")
                .about("Answer a Telegram update read from FILE or stdin")
                .arg(config)
                .arg(Arg::with_name("INPUT").index(1).default_value("-")),
        )
        .subcommand(
            SubCommand::with_name("mask")
                .about("Print a contact the way it appears in reports")
                .arg(Arg::with_name("CONTACT").index(1).required(true))
                .arg(
                    Arg::with_name("style")
                        .long("style")
                        .takes_value(true)
                        .possible_values(&["keep-domain", "local-only"])
                        .default_value("keep-domain"),
                )
                .arg(Arg::with_name("ratio").long("ratio").takes_value(true)),
        )
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn setup(args: &ArgMatches) -> Result<Config> {
    let config = load::config::load(args.value_of("config").map(Path::new))
        .context("Could not load the configuration")?;
    init_tracing(&config.log.level, config.log.json);
    Ok(config)
}

/// Reads a command line expression, printing the parse report on failure
fn expression<T, F>(what: &str, f: F) -> Result<T>
where
    F: FnOnce(&mut error::Record) -> Option<T>,
{
    let mut errs = error::Record::new();
    let res = f(&mut errs);
    if !errs.is_empty() {
        eprint!("{}", errs);
    }
    match res {
        Some(v) if !errs.is_fatal() => Ok(v),
        _ => Err(anyhow!("Invalid {}", what)),
    }
}

fn monobank(config: &Config) -> Result<Monobank> {
    ensure!(!config.monobank.token.is_empty(), "No Monobank token configured (MONOBANK_TOKEN)");
    ensure!(!config.monobank.jar_id.is_empty(), "No jar configured (MONOBANK_JAR_ID)");
    Monobank::new(&config.monobank).context("Could not build the Monobank client")
}

/// Statement of `range` from `source`, then the selection
fn run_draw<S, D>(
    config: &Config,
    source: S,
    range: &TimeWindow,
    policy: FetchPolicy,
    dice: &mut D,
) -> Result<Selection>
where
    S: StatementSource,
    D: Dice + ?Sized,
{
    let mut fetcher = LedgerFetcher::new(source, policy, config.retry_policy());
    let ledger = fetcher
        .fetch(range)
        .with_context(|| format!("Could not fetch the jar statement over {}", range))?;
    info!(records = ledger.len(), "statement complete");
    let settings = config.raffle_config();
    info!(mask = %settings.mask, min_amount = %settings.min_amount, "drawing");
    raffle::select(&ledger, &settings, dice).context("Could not run the raffle")
}

fn print_table(config: &Config, selection: &Selection) {
    println!(
        "{}",
        Table::from(&selection.stats, &config.raffle.currency).with_title("Raffle")
    );
}

fn summary(config: &Config, selection: &Selection) -> String {
    Summary::new(selection, config.raffle_config().min_amount, &config.raffle.currency).to_string()
}

fn draw(args: &ArgMatches) -> Result<()> {
    let config = setup(args)?;
    let range = match args.value_of("range") {
        Some(text) => expression("range", |errs| {
            parse::range("--range", text, config.offset(), Utc::now(), errs)
        })?,
        None => config.default_range(Utc::now())?,
    };
    let mut policy = config.fetch_policy();
    if let Some(text) = args.value_of("span") {
        let min = policy.min_span;
        policy.initial_span =
            expression("span", |errs| parse::initial_span("--span", text, min, errs))?;
    }
    let chat = args
        .value_of("chat")
        .map(|id| id.parse::<i64>().with_context(|| format!("Invalid chat id '{}'", id)))
        .transpose()?;

    let selection = run_draw(&config, monobank(&config)?, &range, policy, &mut Entropy)?;
    print_table(&config, &selection);
    let messages = vec![summary(&config, &selection)];
    let files = export::all(&selection);
    match chat {
        Some(chat) if !args.is_present("dry-run") => {
            ensure!(!config.telegram.token.is_empty(), "No Telegram token configured (TELEGRAM_TOKEN)");
            let mut bot = Telegram::new(&config.telegram)?;
            notify::publish(&mut bot, chat, &messages, &files)?;
        }
        _ => {
            let mut console = Console::new(args.value_of("out").map(Path::new));
            notify::publish(&mut console, 0, &messages, &files)?;
        }
    }
    Ok(())
}

fn webhook(args: &ArgMatches) -> Result<()> {
    let config = setup(args)?;
    let raw = match args.value_of("INPUT") {
        None | Some("-") => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Could not read stdin")?;
            buf
        }
        Some(path) => fs::read_to_string(path).with_context(|| format!("Could not read {}", path))?,
    };
    let trigger = match trigger::parse(&raw).context("Update is not valid JSON")? {
        Some(trigger) => trigger,
        None => {
            info!("update carries no message from a named user, ignored");
            return Ok(());
        }
    };
    info!(user = %trigger.username, text = %trigger.text, "got a message");
    if !config.is_allowed(&trigger.username) {
        warn!(user = %trigger.username, "user is not allowed to draw, ignored");
        return Ok(());
    }
    ensure!(!config.telegram.token.is_empty(), "No Telegram token configured (TELEGRAM_TOKEN)");
    let mut bot = Telegram::new(&config.telegram)?;
    bot.message(trigger.chat_id, &format!("hello, @{}", trigger.username))?;

    let outcome = config
        .default_range(Utc::now())
        .map_err(anyhow::Error::from)
        .and_then(|range| {
            let source = monobank(&config)?;
            run_draw(&config, source, &range, config.fetch_policy(), &mut Entropy)
        });
    match outcome {
        Ok(selection) => {
            print_table(&config, &selection);
            let messages = vec![summary(&config, &selection)];
            notify::publish(&mut bot, trigger.chat_id, &messages, &export::all(&selection))?;
            Ok(())
        }
        Err(e) => {
            if let Err(notify_err) = bot.message(trigger.chat_id, &format!("Draw failed: {:#}", e)) {
                warn!(error = %notify_err, "could not report the failure to the chat");
            }
            Err(e)
        }
    }
}

fn mask(args: &ArgMatches) -> Result<()> {
    let ratio = args
        .value_of("ratio")
        .map(|r| r.parse::<f64>().with_context(|| format!("Invalid ratio '{}'", r)))
        .transpose()?;
    if let Some(r) = ratio {
        ensure!(r > 0.0 && r <= 1.0, "Ratio must be in (0, 1], got {}", r);
    }
    let style = args.value_of("style").unwrap_or("keep-domain");
    let style = MaskStyle::from_name(style, ratio)
        .ok_or_else(|| anyhow!("Unknown mask style '{}'", style))?;
    let contact = args.value_of("CONTACT").unwrap_or_default();
    println!("{}", style.mask(contact));
    Ok(())
}

/// Print an error and its causes with the same layout as parse reports
fn report(err: &anyhow::Error) {
    let mut errs = error::Record::new();
    let entry = errs.make(err);
    for cause in err.chain().skip(1) {
        entry.text(cause);
    }
    eprint!("{}", errs);
}

fn main() {
    let matches = app().get_matches();
    let res = match matches.subcommand() {
        ("draw", Some(args)) => draw(args),
        ("webhook", Some(args)) => webhook(args),
        ("mask", Some(args)) => mask(args),
        (other, _) => Err(anyhow!("Unknown command '{}'", other)),
    };
    if let Err(err) = res {
        report(&err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_line() {
        let m = app()
            .get_matches_from_safe(vec![
                "jarraffle", "draw", "--range", "2022-Dec-01 ..", "--chat", "42", "--dry-run",
            ])
            .unwrap();
        let (name, args) = m.subcommand();
        assert_eq!(name, "draw");
        let args = args.unwrap();
        assert_eq!(args.value_of("range"), Some("2022-Dec-01 .."));
        assert_eq!(args.value_of("chat"), Some("42"));
        assert!(args.is_present("dry-run"));

        let m = app().get_matches_from_safe(vec!["jarraffle", "webhook"]).unwrap();
        assert_eq!(m.subcommand_matches("webhook").unwrap().value_of("INPUT"), Some("-"));

        assert!(app()
            .get_matches_from_safe(vec!["jarraffle", "mask", "a@b.c", "--style", "bogus"])
            .is_err());
    }

    use crate::lib::{amount::Amount, fetch::SourceError, record::TransactionRecord};

    /// The whole jar, answered one window at a time
    struct Statement(Vec<TransactionRecord>);

    impl StatementSource for Statement {
        fn statement(&mut self, window: &TimeWindow) -> Result<Vec<TransactionRecord>, SourceError> {
            Ok(self
                .0
                .iter()
                .filter(|rec| window.contains(rec.timestamp().unwrap()))
                .cloned()
                .collect())
        }
    }

    struct Loaded(Vec<u64>);

    impl Dice for Loaded {
        fn roll(&mut self, sides: u64) -> u64 {
            let face = self.0.remove(0);
            assert!(face < sides);
            face
        }
    }

    macro_rules! donation {
        ( $time:expr, $amount:expr, $who:expr, $comment:expr ) => {
            TransactionRecord {
                id: None,
                amount: Amount($amount),
                time: $time,
                description: format!("Від: {}", $who),
                comment: Some($comment.to_string()),
            }
        };
    }

    #[test]
    fn statement_to_report() {
        let source = Statement(vec![
            donation!(100, 100_000, "Ann", "ann@x.com"),
            donation!(300, 50_000, "Bob", "thanks bob@y.com"),
            donation!(700, 1_000, "Eve", ""),
            donation!(5_000, 900_000, "Late", "late@z.com"),
        ]);
        let config = Config::default();
        let mut policy = config.fetch_policy();
        policy.initial_span = chrono::Duration::seconds(250);
        let range = TimeWindow::from_unix(0, 1_000).unwrap();

        let selection = run_draw(&config, source, &range, policy, &mut Loaded(vec![2])).unwrap();
        assert_eq!(selection.stats.total, Amount(151_000));
        assert_eq!(selection.stats.slots, 3);
        assert_eq!(selection.stats.excluded, 1);
        assert_eq!(
            selection.winner.as_deref(),
            Some("Bob (b**@y.com) @ 1970-01-01 00:05:00")
        );

        let text = summary(&config, &selection);
        assert!(text.contains("1,510.00 UAH"));
        assert!(text.contains("Bob (b**@y.com)"));
        let files = export::all(&selection);
        assert_eq!(files[0].1.lines().count(), 4);
        assert_eq!(files[1].1.lines().count(), 4);
    }

    #[test]
    fn bad_expressions_fail() {
        assert!(expression("span", |errs| parse::span("--span", "12 parsecs", errs)).is_err());
        let span = expression("span", |errs| parse::span("--span", "1d12h", errs)).unwrap();
        assert_eq!(span, chrono::Duration::hours(36));
    }
}
