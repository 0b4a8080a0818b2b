//! Reports for everything that goes wrong before or during a draw
//!
//! Command line expressions carry the offending span through
//! `pest::error::Error::new_from_span`, runtime failures carry their cause
//! chain as text. A `Record` collects both errors and warnings: errors stop
//! the run, warnings describe an input that was adjusted.
//!
//! ```rust
//! errs.make("Empty range")
//!     .span(&loc, "does not end after it starts")
//!     .text(format!("{} is not before {}", start, end))
//!     .hint("swap the two bounds")
//! ```
//!
//! ```txt
//! --> Error: Empty range
//!  |     --> --range:1:1
//!  |      |
//!  |    1 | @100 .. @50
//!  |      | ^---------^
//!  |      |
//!  |      = does not end after it starts
//!  |  1970-01-01 00:01:40 UTC is not before 1970-01-01 00:00:50 UTC
//!  |      ? hint: swap the two bounds
//! 1 error
//! ```

use std::fmt;

use crate::load::parse::Rule;

/// Name of the input (`--range`, `--span`, ...) and the span within it
pub type Loc<'i> = (&'i str, pest::Span<'i>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

impl Level {
    fn color(self) -> &'static str {
        match self {
            Level::Warning => YELLOW,
            Level::Error => RED,
        }
    }

    fn header(self) -> &'static str {
        match self {
            Level::Warning => "--> Warning",
            Level::Error => "--> Error",
        }
    }
}

/// One entry of a report, built with chained calls after `Record::make`
#[must_use]
#[derive(Debug)]
pub struct Error {
    level: Level,
    label: String,
    items: Vec<Item>,
}

#[derive(Debug)]
enum Item {
    /// annotated input
    Block(Box<pest::error::Error<Rule>>),
    Text(String),
    Hint(String),
}

/// Every problem found in the inputs of one command
#[must_use]
#[derive(Debug, Default)]
pub struct Record {
    contents: Vec<Error>,
}

impl Error {
    fn new<S>(msg: S) -> Self
    where
        S: ToString,
    {
        Self {
            level: Level::Error,
            label: msg.to_string(),
            items: Vec::new(),
        }
    }

    /// Attach a parser failure, with the rules renamed for humans
    pub fn from(&mut self, err: pest::error::Error<Rule>) -> &mut Self {
        self.items
            .push(Item::Block(Box::new(err.renamed_rules(rule_rename))));
        self
    }

    /// The input was accepted after an adjustment
    pub fn nonfatal(&mut self) -> &mut Self {
        self.level = Level::Warning;
        self
    }

    pub fn span<S>(&mut self, loc: &Loc, msg: S) -> &mut Self
    where
        S: ToString,
    {
        let variant = pest::error::ErrorVariant::CustomError {
            message: msg.to_string(),
        };
        let block = pest::error::Error::new_from_span(variant, loc.1.clone()).with_path(loc.0);
        self.items.push(Item::Block(Box::new(block)));
        self
    }

    pub fn text<S>(&mut self, msg: S) -> &mut Self
    where
        S: ToString,
    {
        self.items.push(Item::Text(msg.to_string()));
        self
    }

    pub fn hint<S>(&mut self, msg: S) -> &mut Self
    where
        S: ToString,
    {
        self.items.push(Item::Hint(msg.to_string()));
        self
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    fn count(&self, level: Level) -> usize {
        self.contents.iter().filter(|e| e.level == level).count()
    }

    pub fn is_fatal(&self) -> bool {
        self.count_errors() > 0
    }

    pub fn count_errors(&self) -> usize {
        self.count(Level::Error)
    }

    pub fn count_warnings(&self) -> usize {
        self.count(Level::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn make<S>(&mut self, msg: S) -> &mut Error
    where
        S: ToString,
    {
        self.contents.push(Error::new(msg));
        let last = self.contents.len() - 1;
        &mut self.contents[last]
    }
}

const RED: &str = "\x1b[0;91;1m";
const YELLOW: &str = "\x1b[0;93;1m";
const BLUE: &str = "\x1b[0;96;1m";
const WHITE: &str = "\x1b[0;1m";
const NONE: &str = "\x1b[0m";

/// At most this many entries are printed
const SHOWN: usize = 10;

/// Lines of a pest report, behind the margin of the enclosing entry
fn write_block(f: &mut fmt::Formatter<'_>, color: &str, block: &str) -> fmt::Result {
    for line in block.lines() {
        write!(f, " {}|{}  ", color, BLUE)?;
        for c in line.chars() {
            match c {
                '|' | '=' => write!(f, "{}{}", c, NONE)?,
                '^' => write!(f, "{}^", color)?,
                _ => write!(f, "{}", c)?,
            }
        }
        writeln!(f, "{}", NONE)?;
    }
    Ok(())
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = self.level.color();
        writeln!(f, "{}{}:{} {}{}", color, self.level.header(), WHITE, self.label, NONE)?;
        for item in &self.items {
            match item {
                Item::Block(err) => write_block(f, color, &err.to_string())?,
                Item::Text(txt) => writeln!(f, " {}|  {}{}{}", color, WHITE, txt, NONE)?,
                Item::Hint(txt) => writeln!(f, " {}|      {}? hint: {}{}", color, BLUE, NONE, txt)?,
            }
        }
        Ok(())
    }
}

fn plural(n: usize, word: &str) -> String {
    format!("{} {}{}", n, word, if n == 1 { "" } else { "s" })
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        // errors first, they explain why nothing happened
        let mut sorted: Vec<&Error> = self.contents.iter().collect();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.level));
        for err in sorted.iter().take(SHOWN) {
            write!(f, "{}", err)?;
        }
        if sorted.len() > SHOWN {
            writeln!(f, "{}... and {} more{}", WHITE, sorted.len() - SHOWN, NONE)?;
        }
        let (errors, warnings) = (self.count_errors(), self.count_warnings());
        let summary = match (errors, warnings) {
            (0, w) => plural(w, "warning"),
            (e, 0) => plural(e, "error"),
            (e, w) => format!("{}, {}", plural(e, "error"), plural(w, "warning")),
        };
        let color = if errors > 0 { RED } else { YELLOW };
        writeln!(f, "{}{}{}", color, summary, NONE)
    }
}

/// User-friendly names of the grammar rules
fn rule_rename(r: &Rule) -> String {
    String::from(match r {
        Rule::EOI => "end of input",
        Rule::number => "a number",
        Rule::unix => "a unix timestamp ('@1669845600')",
        Rule::year => "a 4-digit year",
        Rule::month => "a month ('Jan' ... 'Dec')",
        Rule::day => "a 1- or 2-digit day number",
        Rule::date => "a date YYYY-Mmm-DD",
        Rule::hour => "a 1- or 2-digit hour",
        Rule::minute => "2-digit minutes",
        Rule::second => "2-digit seconds",
        Rule::clock => "a time of day HH:MM or HH:MM:SS",
        Rule::calendar => "a date with an optional time of day",
        Rule::instant => "a date or a unix timestamp",
        Rule::range => "a range 'start .. end?'",
        Rule::unit => "a unit d, h, m or s",
        Rule::span_term => "a duration such as '12h'",
        Rule::span => "a sequence of durations such as '1d12h'",
        _ => "valid input",
    })
}
