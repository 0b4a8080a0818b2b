//! Plain text report sent to the chat

use std::fmt::{self, Write};

use crate::lib::{amount::Amount, raffle::Selection};

/// Statistics and outcome of a draw, one `label: value` per line
pub struct Summary<'d> {
    selection: &'d Selection,
    min_amount: Amount,
    currency: &'d str,
}

impl<'d> Summary<'d> {
    pub fn new(selection: &'d Selection, min_amount: Amount, currency: &'d str) -> Self {
        Self {
            selection,
            min_amount,
            currency,
        }
    }

    fn line(&self, buf: &mut String, label: &str, value: impl fmt::Display) -> fmt::Result {
        writeln!(buf, "{:<32}{}", format!("{}:", label), value)
    }

    fn money(&self, a: Amount) -> String {
        format!("{} {}", a, self.currency)
    }

    fn render(&self) -> Result<String, fmt::Error> {
        let stats = &self.selection.stats;
        let mut buf = String::new();
        self.line(&mut buf, "Totally raised", self.money(stats.total))?;
        self.line(&mut buf, "Biggest donation", self.money(stats.biggest))?;
        self.line(&mut buf, "Number of unique donators", stats.donors)?;
        self.line(&mut buf, "Number of slots", stats.slots)?;
        writeln!(buf)?;
        match &self.selection.winner {
            Some(winner) => self.line(&mut buf, "Selected person", winner)?,
            None => writeln!(
                buf,
                "Not enough donations of at least {} {}",
                self.min_amount.major(),
                self.currency
            )?,
        }
        Ok(buf)
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render()?)
    }
}
