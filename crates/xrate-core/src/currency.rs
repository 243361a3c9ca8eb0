use crate::job::JobRecord;

/// A currency the producer knows how to generate jobs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    pub code: &'static str,
    pub name: &'static str,
}

pub const CURRENCIES: &[Currency] = &[
    Currency { code: "USD", name: "US Dollar" },
    Currency { code: "EUR", name: "Euro" },
    Currency { code: "GBP", name: "British Pound" },
    Currency { code: "INR", name: "Indian Rupee" },
    Currency { code: "AUD", name: "Australian Dollar" },
    Currency { code: "CAD", name: "Canadian Dollar" },
    Currency { code: "SGD", name: "Singapore Dollar" },
    Currency { code: "CHF", name: "Swiss Franc" },
    Currency { code: "MYR", name: "Malaysian Ringgit" },
    Currency { code: "JPY", name: "Japanese Yen" },
    Currency { code: "CNY", name: "Chinese Yuan Renminbi" },
    Currency { code: "NZD", name: "New Zealand Dollar" },
    Currency { code: "THB", name: "Thai Baht" },
    Currency { code: "HUF", name: "Hungarian Forint" },
    Currency { code: "AED", name: "Emirati Dirham" },
    Currency { code: "HKD", name: "Hong Kong Dollar" },
    Currency { code: "RUB", name: "Russian Ruble" },
    Currency { code: "DKK", name: "Danish Krone" },
    Currency { code: "PKR", name: "Pakistani Rupee" },
    Currency { code: "ILS", name: "Israeli Shekel" },
    Currency { code: "TWD", name: "Taiwan New Dollar" },
    Currency { code: "UZS", name: "Uzbekistani Som" },
];

pub fn lookup(code: &str) -> Option<&'static Currency> {
    CURRENCIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// Generates jobs for random, distinct currency pairs.
///
/// xorshift64 seeded from the clock: fine for spreading load, not crypto.
#[derive(Debug, Clone)]
pub struct PairGenerator {
    state: u64,
}

impl PairGenerator {
    pub fn new(seed: u64) -> Self {
        // xorshift must not start from zero.
        Self { state: seed.max(1) }
    }

    pub fn from_clock() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::new(seed)
    }

    fn next_index(&mut self) -> usize {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x % CURRENCIES.len() as u64) as usize
    }

    pub fn next_job(&mut self) -> JobRecord {
        let from = self.next_index();
        let mut to = self.next_index();
        while to == from {
            to = self.next_index();
        }
        JobRecord::new(CURRENCIES[from].code, CURRENCIES[to].code)
    }
}
