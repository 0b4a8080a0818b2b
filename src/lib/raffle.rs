//! Donation-weighted raffle
//!
//! Every donation of at least `min_amount` buys one slot per whole
//! `min_amount` donated, the winner is one slot drawn uniformly.

use chrono::{FixedOffset, Offset, TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::lib::{amount::Amount, mask::MaskStyle, record::TransactionRecord};

/// Separator between the statement prefix and the donor's name
const PERSON_SEPARATOR: &str = ": ";

/// Why a record cannot take part in the raffle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    /// no `": "` in the description
    MissingSeparator,
    /// timestamp is out of the representable range
    InvalidTime,
}

/// A record the raffle refuses to interpret
///
/// Skipping it would silently change the odds, so the whole pass stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record ({reason:?}): {record}")]
pub struct MalformedRecord {
    pub reason: Malformation,
    pub record: TransactionRecord,
}

/// Raffle rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaffleConfig {
    /// price of one slot, must be positive
    pub min_amount: Amount,
    pub mask: MaskStyle,
    /// timezone used to print donation times
    pub offset: FixedOffset,
}

impl Default for RaffleConfig {
    fn default() -> Self {
        Self {
            min_amount: Amount::from_major(500),
            mask: MaskStyle::default(),
            offset: Utc.fix(),
        }
    }
}

/// Aggregates over the whole ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub total: Amount,
    pub biggest: Amount,
    /// distinct `person + contact`
    pub donors: usize,
    /// records below the minimum
    pub excluded: usize,
    /// records worth exactly one slot
    pub at_minimum: usize,
    pub slots: u64,
}

/// One line of the donation log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    /// formatted in the configured timezone
    pub time: String,
    pub person: String,
    /// already masked
    pub contact: String,
    pub amount: Amount,
    /// 0 when excluded
    pub slots: u64,
}

/// Run-length entry of the slot pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub label: String,
    pub times: u64,
}

/// Multiset of slot labels, in ledger order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotPool {
    entries: Vec<Slot>,
    len: u64,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `times` slots for `label`, ignored when `times == 0`
    pub fn push(&mut self, label: String, times: u64) {
        if times > 0 {
            self.len += times;
            self.entries.push(Slot { label, times });
        }
    }

    /// Number of slots, counting repetitions
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every slot, each label repeated as many times as it was bought
    pub fn expanded(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .flat_map(|slot| std::iter::repeat(slot.label.as_str()).take(slot.times as usize))
    }

    /// Label of the `index`-th slot of the expanded pool
    pub fn get(&self, index: u64) -> Option<&str> {
        let mut seen = 0u64;
        for slot in &self.entries {
            seen += slot.times;
            if index < seen {
                return Some(&slot.label);
            }
        }
        None
    }

    /// One slot drawn uniformly, `None` if the pool is empty
    pub fn draw<D: Dice + ?Sized>(&self, dice: &mut D) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        self.get(dice.roll(self.len))
    }
}

/// Source of uniform slot indices
pub trait Dice {
    /// Uniform in `0..sides`, `sides > 0`
    fn roll(&mut self, sides: u64) -> u64;
}

/// Fresh generator seeded from system entropy on every roll
#[derive(Debug, Default, Clone, Copy)]
pub struct Entropy;

impl Dice for Entropy {
    fn roll(&mut self, sides: u64) -> u64 {
        StdRng::from_entropy().gen_range(0..sides)
    }
}

/// Result of a raffle pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub stats: Statistics,
    pub pool: SlotPool,
    pub donations: Vec<Donation>,
    /// `None` means "no winner": nobody reached the minimum
    pub winner: Option<String>,
}

/// Donor name: everything after the first `": "`
pub fn person(description: &str) -> Option<&str> {
    description
        .split_once(PERSON_SEPARATOR)
        .map(|(_, person)| person)
}

/// First word of the comment that looks like an address (`@` not in first position)
pub fn contact(comment: &str) -> &str {
    comment
        .split(|c: char| c == ' ' || c == '\n')
        .find(|word| word.find('@').map_or(false, |at| at > 0))
        .unwrap_or("")
}

/// Classify the ledger, build the slot pool and draw a winner
pub fn select<D: Dice + ?Sized>(
    ledger: &[TransactionRecord],
    config: &RaffleConfig,
    dice: &mut D,
) -> Result<Selection, MalformedRecord> {
    let malformed = |reason: Malformation, record: &TransactionRecord| MalformedRecord {
        reason,
        record: record.clone(),
    };
    let mut stats = Statistics::default();
    let mut pool = SlotPool::new();
    let mut donations = Vec::with_capacity(ledger.len());
    let mut donors = HashSet::new();

    for record in ledger {
        let donor = person(&record.description)
            .ok_or_else(|| malformed(Malformation::MissingSeparator, record))?;
        let time = config
            .offset
            .timestamp_opt(record.time, 0)
            .single()
            .ok_or_else(|| malformed(Malformation::InvalidTime, record))?
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let raw_contact = contact(record.comment.as_deref().unwrap_or(""));
        let masked = config.mask.mask(raw_contact);

        donors.insert(format!("{}{}", donor, raw_contact));
        stats.total += record.amount;
        stats.biggest = stats.biggest.max(record.amount);

        let times = record.amount.times(config.min_amount);
        let slots = if times >= 1 {
            let label = format!("{} ({}) @ {}", donor, masked, time);
            debug!(donor = %label, times, "included");
            pool.push(label, times as u64);
            if times == 1 {
                stats.at_minimum += 1;
            }
            times as u64
        } else {
            debug!(donor, amount = %record.amount, "excluded");
            stats.excluded += 1;
            0
        };
        donations.push(Donation {
            time,
            person: donor.to_string(),
            contact: masked,
            amount: record.amount,
            slots,
        });
    }
    stats.donors = donors.len();
    stats.slots = pool.len();

    let winner = pool.draw(dice).map(str::to_string);
    info!(
        total = %stats.total,
        donors = stats.donors,
        slots = stats.slots,
        winner = winner.as_deref().unwrap_or("<none>"),
        "raffle drawn"
    );
    Ok(Selection {
        stats,
        pool,
        donations,
        winner,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    /// Any `rand` generator
    struct Seeded<R>(R);

    impl<R: Rng> Dice for Seeded<R> {
        fn roll(&mut self, sides: u64) -> u64 {
            self.0.gen_range(0..sides)
        }
    }

    /// Rolls a fixed sequence of indices
    struct Loaded(Vec<u64>);

    impl Dice for Loaded {
        fn roll(&mut self, sides: u64) -> u64 {
            let face = self.0.remove(0);
            assert!(face < sides);
            face
        }
    }

    macro_rules! rec {
        ( $amount:expr, $time:expr, $desc:expr ) => {
            TransactionRecord {
                id: None,
                amount: Amount($amount),
                time: $time,
                description: $desc.to_string(),
                comment: None,
            }
        };
        ( $amount:expr, $time:expr, $desc:expr, $comment:expr ) => {
            TransactionRecord {
                comment: Some($comment.to_string()),
                ..rec!($amount, $time, $desc)
            }
        };
    }

    fn config() -> RaffleConfig {
        RaffleConfig {
            min_amount: Amount(50000),
            ..RaffleConfig::default()
        }
    }

    #[test]
    fn extracts_person() {
        assert_eq!(person("Від: Олена"), Some("Олена"));
        assert_eq!(person("Від: Олена: Петренко"), Some("Олена: Петренко"));
        assert_eq!(person("no colon here"), None);
        assert_eq!(person("Від:Олена"), None);
    }

    #[test]
    fn extracts_contact() {
        assert_eq!(contact("for the drones olena@example.com thanks"), "olena@example.com");
        assert_eq!(contact("line one\nivan@ukr.net"), "ivan@ukr.net");
        assert_eq!(contact("@handle a@b first@x.y"), "a@b");
        assert_eq!(contact("no address"), "");
        assert_eq!(contact(""), "");
    }

    #[test]
    fn weighting() {
        let ledger = vec![rec!(150000, 1669850000, "Від: Олена", "olena@example.com")];
        let sel = select(&ledger, &config(), &mut Loaded(vec![2])).unwrap();
        assert_eq!(sel.pool.len(), 3);
        assert_eq!(sel.stats.slots, 3);
        assert_eq!(sel.stats.excluded, 0);
        assert_eq!(sel.stats.at_minimum, 0);
        assert_eq!(sel.pool.entries.len(), 1);
        assert_eq!(
            sel.winner.as_deref(),
            Some("Олена (ol***@example.com) @ 2022-11-30 23:13:20")
        );
    }

    #[test]
    fn exclusion_boundary() {
        let ledger = vec![
            rec!(49999, 1, "Від: Below"),
            rec!(50000, 2, "Від: Exactly"),
        ];
        let sel = select(&ledger, &config(), &mut Loaded(vec![0])).unwrap();
        assert_eq!(sel.stats.excluded, 1);
        assert_eq!(sel.stats.at_minimum, 1);
        assert_eq!(sel.stats.slots, 1);
        assert_eq!(sel.winner.as_deref(), Some("Exactly () @ 1970-01-01 00:00:02"));
        assert_eq!(sel.donations[0].slots, 0);
        assert_eq!(sel.donations[1].slots, 1);
    }

    #[test]
    fn statistics() {
        let ledger = vec![
            rec!(100000, 10, "Від: Olena", "olena@example.com"),
            rec!(20000, 20, "Від: Olena", "olena@example.com"),
            rec!(70000, 30, "Від: Olena", "Olena@example.com"),
            rec!(300000, 40, "Від: Ivan"),
            rec!(50000, 50, "Поповнення: Ivan"),
            rec!(-1000, 60, "Від: Withdrawal"),
        ];
        let sel = select(&ledger, &config(), &mut Loaded(vec![0])).unwrap();
        let stats = sel.stats;
        assert_eq!(stats.total, Amount(539000));
        assert_eq!(stats.biggest, Amount(300000));
        // case-sensitive identity: the two Olena spellings count twice
        assert_eq!(stats.donors, 4);
        assert_eq!(stats.excluded, 2);
        assert_eq!(stats.at_minimum, 2);
        assert_eq!(stats.slots, 2 + 1 + 6 + 1);
        assert_eq!(sel.donations.len(), 6);
    }

    #[test]
    fn slots_follow_ledger_order() {
        let ledger = vec![
            rec!(100000, 10, "Від: A"),
            rec!(50000, 20, "Від: B"),
        ];
        let sel = select(&ledger, &config(), &mut Loaded(vec![2])).unwrap();
        let expanded: Vec<_> = sel.pool.expanded().collect();
        assert_eq!(
            expanded,
            vec![
                "A () @ 1970-01-01 00:00:10",
                "A () @ 1970-01-01 00:00:10",
                "B () @ 1970-01-01 00:00:20",
            ]
        );
        assert_eq!(sel.winner.as_deref(), Some("B () @ 1970-01-01 00:00:20"));
    }

    #[test]
    fn empty_pool_has_no_winner() {
        let ledger = vec![
            rec!(10000, 10, "Від: A"),
            rec!(40000, 20, "Від: B"),
        ];
        let sel = select(&ledger, &config(), &mut Loaded(vec![])).unwrap();
        assert!(sel.pool.is_empty());
        assert_eq!(sel.winner, None);
        assert_eq!(sel.stats.total, Amount(50000));
        assert_eq!(sel.stats.biggest, Amount(40000));
        assert_eq!(sel.stats.excluded, 2);
        assert_eq!(sel.stats.donors, 2);
    }

    #[test]
    fn empty_ledger() {
        let sel = select(&[], &config(), &mut Entropy).unwrap();
        assert_eq!(sel.stats, Statistics::default());
        assert_eq!(sel.winner, None);
    }

    #[test]
    fn malformed_description_aborts() {
        let ledger = vec![
            rec!(100000, 10, "Від: A"),
            rec!(100000, 20, "no colon here"),
        ];
        let err = select(&ledger, &config(), &mut Entropy).unwrap_err();
        assert_eq!(err.reason, Malformation::MissingSeparator);
        assert_eq!(err.record.description, "no colon here");
    }

    #[test]
    fn timezone_and_legacy_mask() {
        let cfg = RaffleConfig {
            offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            mask: MaskStyle::local_only(),
            ..config()
        };
        let ledger = vec![rec!(50000, 1669845600, "Від: A", "thanks\nabcdefghij@gmail.com")];
        let sel = select(&ledger, &cfg, &mut Loaded(vec![0])).unwrap();
        assert_eq!(sel.winner.as_deref(), Some("A (abcdef****) @ 2022-12-01 00:00:00"));
    }

    #[test]
    fn pool_indexing() {
        let mut pool = SlotPool::new();
        pool.push("a".to_string(), 1);
        pool.push("skip".to_string(), 0);
        pool.push("b".to_string(), 2);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.entries.len(), 2);
        assert_eq!(pool.get(0), Some("a"));
        assert_eq!(pool.get(1), Some("b"));
        assert_eq!(pool.get(2), Some("b"));
        assert_eq!(pool.get(3), None);
    }

    #[test]
    fn draw_distribution() {
        let mut pool = SlotPool::new();
        pool.push("A".to_string(), 1);
        pool.push("B".to_string(), 9);
        let mut dice = Seeded(StdRng::seed_from_u64(0x5eed));
        let n = 10_000;
        let b = (0..n)
            .filter(|_| pool.draw(&mut dice) == Some("B"))
            .count();
        let freq = b as f64 / n as f64;
        assert!((freq - 0.9).abs() < 0.02, "B drawn with frequency {}", freq);
    }

    #[test]
    fn entropy_draws_from_pool() {
        let mut pool = SlotPool::new();
        pool.push("A".to_string(), 2);
        pool.push("B".to_string(), 3);
        for _ in 0..100 {
            let winner = pool.draw(&mut Entropy).unwrap();
            assert!(winner == "A" || winner == "B");
        }
        assert_eq!(SlotPool::new().draw(&mut Entropy), None);
    }
}
