use std::fmt;

use crate::lib::{amount::Amount, raffle::Statistics};

/// Two-column box drawing of the raffle statistics
pub struct Table<'d> {
    stats: &'d Statistics,
    currency: &'d str,
    title: Option<String>,
}

struct BoxFmt {
    width: usize,
    text: String,
}

struct ColFmt {
    width: usize,
    label: BoxFmt,
    boxes: Vec<BoxFmt>,
}

struct GridFmt {
    labels: ColFmt,
    values: ColFmt,
}

impl<'d> Table<'d> {
    pub fn from(stats: &'d Statistics, currency: &'d str) -> Self {
        Self {
            stats,
            currency,
            title: None,
        }
    }

    pub fn with_title<S: ToString>(mut self, title: S) -> Self {
        self.title = Some(title.to_string());
        self
    }

    fn to_formatter(&self) -> GridFmt {
        let s = self.stats;
        let mut grid = GridFmt::with_title(self.title.clone().unwrap_or_default());
        grid.push_line("Totally raised", BoxFmt::amount(s.total, self.currency));
        grid.push_line("Biggest donation", BoxFmt::amount(s.biggest, self.currency));
        grid.push_line("Unique donators", BoxFmt::count(s.donors as u64));
        grid.push_line("Excluded donations", BoxFmt::count(s.excluded as u64));
        grid.push_line("Donations at minimum", BoxFmt::count(s.at_minimum as u64));
        grid.push_line("Slots", BoxFmt::count(s.slots));
        grid
    }
}

impl BoxFmt {
    fn from(text: String) -> Self {
        let width = text.chars().count();
        Self { text, width }
    }

    fn amount(a: Amount, currency: &str) -> Self {
        Self::from(format!("{} {}", a, currency))
    }

    fn count(n: u64) -> Self {
        Self::from(n.to_string())
    }
}

impl ColFmt {
    fn with_label(label: BoxFmt) -> Self {
        Self {
            width: label.width,
            label,
            boxes: Vec::new(),
        }
    }

    fn push(&mut self, b: BoxFmt) {
        self.width = self.width.max(b.width);
        self.boxes.push(b);
    }
}

impl GridFmt {
    fn with_title(title: String) -> Self {
        Self {
            labels: ColFmt::with_label(BoxFmt::from(title)),
            values: ColFmt::with_label(BoxFmt::from(String::new())),
        }
    }

    fn push_line(&mut self, label: &str, value: BoxFmt) {
        self.labels.push(BoxFmt::from(label.to_string()));
        self.values.push(value);
    }
}

impl fmt::Display for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_formatter())
    }
}

impl fmt::Display for GridFmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // upper border
        write!(f, "{}", ULCORNER)?;
        self.labels.hline(f)?;
        write!(f, "{}", LOJOIN)?;
        self.values.hline(f)?;
        writeln!(f, "{}", URCORNER)?;
        // title line
        if self.labels.label.width > 0 {
            write!(f, "{}", VLINE)?;
            self.labels.write_label(f)?;
            write!(f, "{}", VLINE)?;
            self.values.write_label(f)?;
            writeln!(f, "{}", VLINE)?;
            // separator
            write!(f, "{}", RTJOIN)?;
            self.labels.hline(f)?;
            write!(f, "{}", CROSS)?;
            self.values.hline(f)?;
            writeln!(f, "{}", LTJOIN)?;
        }
        // main block
        for idx in 0..self.labels.len() {
            write!(f, "{}", VLINE)?;
            self.labels.write_item(f, idx, false)?;
            write!(f, "{}", VLINE)?;
            self.values.write_item(f, idx, true)?;
            writeln!(f, "{}", VLINE)?;
        }
        // lower border
        write!(f, "{}", DLCORNER)?;
        self.labels.hline(f)?;
        write!(f, "{}", HIJOIN)?;
        self.values.hline(f)?;
        writeln!(f, "{}", DRCORNER)?;
        Ok(())
    }
}

impl ColFmt {
    fn write_label(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.label.write(f, self.width, false)
    }

    fn write_item(&self, f: &mut fmt::Formatter, idx: usize, right: bool) -> fmt::Result {
        self.boxes[idx].write(f, self.width, right)
    }

    fn len(&self) -> usize {
        self.boxes.len()
    }

    fn hline(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", HLINE.repeat(self.width + 2))
    }
}

const HLINE: &str = "─";
const VLINE: &str = "│";
const ULCORNER: &str = "┌";
const URCORNER: &str = "┐";
const DLCORNER: &str = "└";
const DRCORNER: &str = "┘";
const LTJOIN: &str = "┤";
const RTJOIN: &str = "├";
const HIJOIN: &str = "┴";
const LOJOIN: &str = "┬";
const CROSS: &str = "┼";

impl BoxFmt {
    fn write(&self, f: &mut fmt::Formatter, width: usize, right: bool) -> fmt::Result {
        let padding = " ".repeat(width.saturating_sub(self.width));
        if right {
            write!(f, " {}{} ", padding, self.text)
        } else {
            write!(f, " {}{} ", self.text, padding)
        }
    }
}
