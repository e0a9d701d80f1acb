// 6.0 seed.rs: historical price series handed to the pricing formulas at creation.
// opaque to the orchestrator: only canonical decimal literals are accepted, so every
// value reaches the constructor with exactly the digits it was written with.
// 6.1 an operator can override a series by putting literal arrays in the registry.

use crate::registry::{AddressRegistry, RegistryError};
use crate::types::TokenAmount;

// one point per day, 2021-05-01 .. 2021-05-31 (unix seconds)
const DAILY_TIMESTAMPS: &[&str] = &[
    "1619827200", "1619913600", "1620000000", "1620086400",
    "1620172800", "1620259200", "1620345600", "1620432000",
    "1620518400", "1620604800", "1620691200", "1620777600",
    "1620864000", "1620950400", "1621036800", "1621123200",
    "1621209600", "1621296000", "1621382400", "1621468800",
    "1621555200", "1621641600", "1621728000", "1621814400",
    "1621900800", "1621987200", "1622073600", "1622160000",
    "1622246400", "1622332800", "1622419200",
];

// ETH/USD close, 18 decimals
const ETH_USD_PRICES: &[&str] = &[
    "2774740000000000000000", "2947660000000000000000", "2953500000000000000000",
    "3430416540340000000000", "3247650000000000000000", "3519880000000000000000",
    "3489954529590000000000", "3488436531710000000000", "3903490106100000000000",
    "3928482035620000000000", "4013090000000000000000", "4176600000000000000000",
    "4085448053770000000000", "3725481254280000000000", "4084203348240000000000",
    "3651465650740000000000", "3845052808750000000000", "3275699499040000000000",
    "3385480000000000000000", "2506836925640000000000", "2764790000000000000000",
    "2270445447640000000000", "2376051470310000000000", "2115556466970000000000",
    "2635211068340000000000", "2534846933100000000000", "2819860729890000000000",
    "2783311910290000000000", "2783311910290000000000", "2783311910290000000000",
    "2391680446680000000000",
];

// BTC/USD close, 18 decimals
const BTC_USD_PRICES: &[&str] = &[
    "57824004642760000000000", "57847507241770000000000", "56608014068280000000000",
    "57200000000000000000000", "53419545000000000000000", "57396940000000000000000",
    "56440499059920000000000", "57360505574990000000000", "58790360000000000000000",
    "58238789925750000000000", "55751595000000000000000", "56777858200790000000000",
    "54476970599160000000000", "49595125606830000000000", "49958748487510000000000",
    "46846701001660000000000", "46418972740700000000000", "43544763497310000000000",
    "42996067817040000000000", "38237815206770000000000", "39931661605000000000000",
    "35412417127280000000000", "38351110000000000000000", "34870140620410000000000",
    "38664861655630000000000", "38269170000000000000000", "39321175444440000000000",
    "38458035034200000000000", "38107172849610000000000", "38107172849610000000000",
    "36209000000000000000000",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: TokenAmount,
    pub value: TokenAmount,
}

/// A named (timestamp, value) series with its registry override keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceHistory {
    pub timestamps_key: &'static str,
    pub values_key: &'static str,
    pub timestamps: &'static [&'static str],
    pub values: &'static [&'static str],
}

pub const ETH_USD_HISTORY: PriceHistory = PriceHistory {
    timestamps_key: "ETHPriceTMs",
    values_key: "ETHPrices",
    timestamps: DAILY_TIMESTAMPS,
    values: ETH_USD_PRICES,
};

pub const BTC_USD_HISTORY: PriceHistory = PriceHistory {
    timestamps_key: "BTCPriceTMs",
    values_key: "BTCPrices",
    timestamps: DAILY_TIMESTAMPS,
    values: BTC_USD_PRICES,
};

impl PriceHistory {
    /// Series to hand to the constructor: the registry override if present, else the embedded one.
    pub fn resolve(&self, registry: &AddressRegistry) -> Result<Vec<PricePoint>, RegistryError> {
        let timestamps = registry.series(self.timestamps_key)?;
        let values = registry.series(self.values_key)?;

        match (timestamps, values) {
            (Some(timestamps), Some(values)) => self.pair(&timestamps, &values),
            (None, None) => self.pair(self.timestamps, self.values),
            (Some(_), None) => Err(RegistryError::Malformed {
                key: self.values_key.to_string(),
                reason: format!("missing while {} is set", self.timestamps_key),
            }),
            (None, Some(_)) => Err(RegistryError::Malformed {
                key: self.timestamps_key.to_string(),
                reason: format!("missing while {} is set", self.values_key),
            }),
        }
    }

    fn pair<S: AsRef<str>>(&self, timestamps: &[S], values: &[S]) -> Result<Vec<PricePoint>, RegistryError> {
        if timestamps.len() != values.len() {
            return Err(RegistryError::Malformed {
                key: self.values_key.to_string(),
                reason: format!(
                    "{} timestamps but {} values",
                    timestamps.len(),
                    values.len()
                ),
            });
        }

        timestamps
            .iter()
            .zip(values)
            .map(|(ts, value)| {
                Ok(PricePoint {
                    timestamp: literal(self.timestamps_key, ts.as_ref())?,
                    value: literal(self.values_key, value.as_ref())?,
                })
            })
            .collect()
    }
}

// "0" or digits without a leading zero, within 256 bits
fn literal(key: &str, text: &str) -> Result<TokenAmount, RegistryError> {
    let canonical = !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit())
        && (text == "0" || !text.starts_with('0'));

    canonical
        .then(|| TokenAmount::from_dec_str(text))
        .flatten()
        .ok_or_else(|| RegistryError::Malformed {
            key: key.to_string(),
            reason: format!("{text:?} is not a plain unsigned integer"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn empty_registry() -> (tempfile::TempDir, AddressRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = AddressRegistry::load(dir.path().join("config.json")).unwrap();
        (dir, registry)
    }

    #[test]
    fn embedded_series_are_paired() {
        let (_dir, registry) = empty_registry();

        let eth = ETH_USD_HISTORY.resolve(&registry).unwrap();
        assert_eq!(eth.len(), 31);
        assert_eq!(eth[0].timestamp.to_string(), "1619827200");
        assert_eq!(eth[0].value.to_string(), "2774740000000000000000");

        let btc = BTC_USD_HISTORY.resolve(&registry).unwrap();
        assert_eq!(btc.len(), 31);
        assert_eq!(btc[30].value.to_string(), "36209000000000000000000");
    }

    #[test]
    fn registry_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "ETHPriceTMs": ["10", "20"], "ETHPrices": ["1", "2"] }"#).unwrap();
        let registry = AddressRegistry::load(&path).unwrap();

        let points = ETH_USD_HISTORY.resolve(&registry).unwrap();
        assert_eq!(
            points,
            vec![
                PricePoint { timestamp: TokenAmount::from_u64(10), value: TokenAmount::from_u64(1) },
                PricePoint { timestamp: TokenAmount::from_u64(20), value: TokenAmount::from_u64(2) },
            ]
        );
    }

    #[test]
    fn half_an_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "BTCPriceTMs": ["10"], "BTCPrices": ["1", "2"] }"#).unwrap();
        let registry = AddressRegistry::load(&path).unwrap();
        assert!(matches!(BTC_USD_HISTORY.resolve(&registry), Err(RegistryError::Malformed { .. })));

        fs::write(&path, r#"{ "BTCPriceTMs": ["10"] }"#).unwrap();
        let registry = AddressRegistry::load(&path).unwrap();
        assert!(matches!(BTC_USD_HISTORY.resolve(&registry), Err(RegistryError::Malformed { .. })));

        fs::write(&path, r#"{ "BTCPriceTMs": ["yesterday"], "BTCPrices": ["1"] }"#).unwrap();
        let registry = AddressRegistry::load(&path).unwrap();
        assert!(matches!(BTC_USD_HISTORY.resolve(&registry), Err(RegistryError::Malformed { .. })));
    }

    #[test]
    fn literals_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let wide = "184467440737095516160";
        fs::write(&path, format!(r#"{{ "ETHPriceTMs": ["{wide}", "0"], "ETHPrices": ["7", "8"] }}"#)).unwrap();
        let registry = AddressRegistry::load(&path).unwrap();

        let points = ETH_USD_HISTORY.resolve(&registry).unwrap();
        let timestamps: Vec<String> = points.iter().map(|p| p.timestamp.to_string()).collect();
        assert_eq!(timestamps, vec![wide.to_string(), "0".to_string()]);
    }

    #[test]
    fn non_canonical_literals_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        for bad in ["0010", " 10", "1e3", "-1", ""] {
            fs::write(&path, format!(r#"{{ "ETHPriceTMs": ["10"], "ETHPrices": ["{bad}"] }}"#)).unwrap();
            let registry = AddressRegistry::load(&path).unwrap();
            assert!(
                matches!(
                    ETH_USD_HISTORY.resolve(&registry),
                    Err(RegistryError::Malformed { ref key, .. }) if key == "ETHPrices"
                ),
                "{bad:?} accepted"
            );
        }
    }
}
