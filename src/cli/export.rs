//! Semicolon-separated dumps of a draw
//!
//! `donations.csv` lists every donation with its slot count (contacts are
//! already masked), `slots.csv` lists the pool one slot per line so that
//! anybody can check the drawn index.

use crate::lib::{amount::Amount, raffle::Selection};

pub const DONATIONS_FILE: &str = "donations.csv";
pub const SLOTS_FILE: &str = "slots.csv";

const SEP: char = ';';

/// Quote a field if it would otherwise break the line structure
fn field(raw: &str) -> String {
    if raw.contains(|c: char| c == SEP || c == '"' || c == '\n' || c == '\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Amount without thousands separators, e.g. `12345.67`
fn decimal(a: Amount) -> String {
    let sign = if a.0 < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, (a.0 / 100).abs(), (a.0 % 100).abs())
}

macro_rules! row {
    ( $buf:expr, $( $col:expr ),* ) => {{
        let cols: Vec<String> = vec![ $( field(&$col.to_string()) ),* ];
        $buf.push_str(&cols.join(&SEP.to_string()));
        $buf.push('\n');
    }};
}

pub fn donations(selection: &Selection) -> String {
    let mut buf = String::new();
    row!(buf, "time", "person", "contact", "amount", "slots");
    for d in &selection.donations {
        row!(buf, d.time, d.person, d.contact, decimal(d.amount), d.slots);
    }
    buf
}

pub fn slots(selection: &Selection) -> String {
    let mut buf = String::new();
    row!(buf, "slot", "entry");
    for (idx, entry) in selection.pool.expanded().enumerate() {
        row!(buf, idx, entry);
    }
    buf
}

/// Both files with their canonical names
pub fn all(selection: &Selection) -> Vec<(&'static str, String)> {
    vec![
        (DONATIONS_FILE, donations(selection)),
        (SLOTS_FILE, slots(selection)),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lib::raffle::{Donation, SlotPool, Statistics};

    fn selection() -> Selection {
        let mut pool = SlotPool::new();
        pool.push("Ann (a**@x.com) @ 2022-12-01 00:00:00".to_string(), 2);
        pool.push("Bob; Jr (b**@y.com) @ 2022-12-02 00:00:00".to_string(), 1);
        Selection {
            stats: Statistics::default(),
            pool,
            donations: vec![
                Donation {
                    time: "2022-12-01 00:00:00".to_string(),
                    person: "Ann".to_string(),
                    contact: "a**@x.com".to_string(),
                    amount: Amount(100_000),
                    slots: 2,
                },
                Donation {
                    time: "2022-12-03 00:00:00".to_string(),
                    person: "Eve \"E\"".to_string(),
                    contact: String::new(),
                    amount: Amount(1_050),
                    slots: 0,
                },
            ],
            winner: None,
        }
    }

    #[test]
    fn donation_rows() {
        let text = donations(&selection());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "time;person;contact;amount;slots");
        assert_eq!(lines[1], "2022-12-01 00:00:00;Ann;a**@x.com;1000.00;2");
        assert_eq!(lines[2], "2022-12-03 00:00:00;\"Eve \"\"E\"\"\";;10.50;0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn slot_rows() {
        let text = slots(&selection());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "0;Ann (a**@x.com) @ 2022-12-01 00:00:00");
        assert_eq!(lines[2], "1;Ann (a**@x.com) @ 2022-12-01 00:00:00");
        assert_eq!(lines[3], "2;\"Bob; Jr (b**@y.com) @ 2022-12-02 00:00:00\"");
    }

    #[test]
    fn names() {
        let files = all(&selection());
        assert_eq!(files[0].0, "donations.csv");
        assert_eq!(files[1].0, "slots.csv");
    }
}
