// 1.0: primitives shared by every module. addresses, amounts, identities, timestamps.
// each is a newtype so a registry key never gets passed where an address belongs.

use primitive_types::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// 1.1: opaque on-ledger address. the orchestrator never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub const ZERO: &'static str = "0x0000000000000000000000000000000000000000";

    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn new_unchecked(value: impl Into<String>) -> Self {
        let value = value.into();
        debug_assert!(!value.trim().is_empty());
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Self::ZERO.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::ZERO)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.2: 256-bit token amount. literal supplies like 1e29 overflow every decimal type,
// so amounts stay integers and travel as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    #[must_use]
    pub fn from_dec_str(value: &str) -> Option<Self> {
        U256::from_dec_str(value.trim()).ok().map(Self)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(U256::from(value))
    }

    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    // saturates: a simulated balance can't wrap
    pub fn saturating_add(&self, other: TokenAmount) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TokenAmount::from_dec_str(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid token amount: {raw}")))
    }
}

// 1.3: transaction hash handed back by the ledger on submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.4: which signing role an action runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Administrator,
    Treasury,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Administrator => f.write_str("administrator"),
            Authority::Treasury => f.write_str("treasury"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub authority: Authority,
    pub address: Address,
}

impl Identity {
    pub fn new(authority: Authority, address: Address) -> Self {
        Self { authority, address }
    }
}

// 1.5: identities supplied by the caller. key custody is someone else's problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identities {
    pub admin: Identity,
    pub treasury: Identity,
}

impl Identities {
    pub fn new(admin: Address, treasury: Address) -> Self {
        Self {
            admin: Identity::new(Authority::Administrator, admin),
            treasury: Identity::new(Authority::Treasury, treasury),
        }
    }

    pub fn for_authority(&self, authority: Authority) -> &Identity {
        match authority {
            Authority::Administrator => &self.admin,
            Authority::Treasury => &self.treasury,
        }
    }
}

// 1.6: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(at) => write!(f, "{}", at.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_blank() {
        assert!(Address::new("").is_none());
        assert!(Address::new("   ").is_none());
        assert_eq!(Address::new(" 0xabc ").unwrap().as_str(), "0xabc");
        assert!(Address::zero().is_zero());
    }

    #[test]
    fn token_amount_holds_literal_supplies() {
        let usdt = TokenAmount::from_dec_str("100000000000000000000000000000").unwrap();
        assert_eq!(usdt.to_string(), "100000000000000000000000000000");

        let sld = TokenAmount::from_dec_str("1000000000000000000000000000").unwrap();
        assert!(sld < usdt);
        assert!(TokenAmount::from_dec_str("12ab").is_none());
    }

    #[test]
    fn token_amount_serializes_as_decimal_string() {
        let amount = TokenAmount::from_dec_str("9999999999999999999999999999").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"9999999999999999999999999999\"");

        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn identities_by_authority() {
        let ids = Identities::new(Address::new_unchecked("0xa"), Address::new_unchecked("0xb"));
        assert_eq!(ids.for_authority(Authority::Administrator).address.as_str(), "0xa");
        assert_eq!(ids.for_authority(Authority::Treasury).address.as_str(), "0xb");
    }
}
