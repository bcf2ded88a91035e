//! Asset classes and the per-class prompt profile table.
//!
//! Stages never branch on the asset type themselves; they look up an
//! [`AssetProfile`] and splice its labels and guidance into their prompt.

use serde::{Deserialize, Serialize};

/// Asset class being deliberated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    #[default]
    Stock,
    Cryptocurrency,
}

impl AssetType {
    /// Prompt profile for this asset class.
    pub fn profile(self) -> &'static AssetProfile {
        match self {
            Self::Stock => &STOCK_PROFILE,
            Self::Cryptocurrency => &CRYPTO_PROFILE,
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stock => write!(f, "stock"),
            Self::Cryptocurrency => write!(f, "cryptocurrency"),
        }
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" | "equity" => Ok(Self::Stock),
            "cryptocurrency" | "crypto" => Ok(Self::Cryptocurrency),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

/// Prompt roles that receive asset-specific guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    MarketAnalyst,
    SentimentAnalyst,
    NewsAnalyst,
    FundamentalsAnalyst,
    Bull,
    Bear,
    InvestmentJudge,
    Trader,
    Risky,
    Safe,
    Neutral,
    RiskJudge,
}

/// Labels and guidance for one asset class.
#[derive(Debug)]
pub struct AssetProfile {
    /// Noun used for the thing being traded ("stock", "cryptocurrency").
    pub asset_focus: &'static str,
    /// Prefix describing the subject ("company AAPL", "cryptocurrency BTC").
    pub subject_prefix: &'static str,
    /// Label for the fundamentals report block.
    pub fundamentals_label: &'static str,
    guidance: &'static [(PromptRole, &'static str)],
}

impl AssetProfile {
    /// Extra guidance for `role`; empty when the profile has none.
    pub fn guidance(&self, role: PromptRole) -> &'static str {
        self.guidance
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, text)| *text)
            .unwrap_or("")
    }

    /// "company AAPL" / "cryptocurrency BTC".
    pub fn describe(&self, symbol: &str) -> String {
        format!("{} {}", self.subject_prefix, symbol)
    }
}

static STOCK_PROFILE: AssetProfile = AssetProfile {
    asset_focus: "stock",
    subject_prefix: "company",
    fundamentals_label: "Company fundamentals report",
    guidance: &[],
};

static CRYPTO_PROFILE: AssetProfile = AssetProfile {
    asset_focus: "cryptocurrency",
    subject_prefix: "cryptocurrency",
    fundamentals_label: "Project analysis",
    guidance: &[
        (
            PromptRole::MarketAnalyst,
            "Crypto markets trade around the clock with no circuit breakers. \
             Weigh volume across major exchanges and favour technical structure over valuation multiples.",
        ),
        (
            PromptRole::SentimentAnalyst,
            "Social channels move crypto prices quickly. Track trending discussion, \
             influential accounts and abrupt shifts in community mood.",
        ),
        (
            PromptRole::NewsAnalyst,
            "Prioritise regulatory developments, exchange listings, security incidents, \
             protocol upgrades and institutional adoption news.",
        ),
        (
            PromptRole::FundamentalsAnalyst,
            "There are no earnings. Assess network activity, token supply schedule, \
             developer activity and ecosystem adoption instead.",
        ),
        (
            PromptRole::Bull,
            "Crypto bull factors: network growth, technology improvements, institutional \
             interest, regulatory clarity and an active developer community.",
        ),
        (
            PromptRole::Bear,
            "Crypto bear factors: regulatory risk, extreme volatility, security breaches, \
             competing chains, lack of cash-flow valuation and sentiment-driven pricing.",
        ),
        (
            PromptRole::InvestmentJudge,
            "Remember that crypto positions can move 10-20% in a day; weigh conviction accordingly.",
        ),
        (
            PromptRole::Trader,
            "Crypto trades 24/7 with high volatility and thin liquidity on smaller venues. \
             Size positions conservatively and respect regulatory headline risk.",
        ),
        (
            PromptRole::Risky,
            "Argue the asymmetric upside of early adoption and the opportunities that \
             continuous, volatile markets create for active traders.",
        ),
        (
            PromptRole::Safe,
            "Stress drawdown risk, custody and exchange failures, and regulatory shocks. \
             Prefer small allocations and hard stop-losses.",
        ),
        (
            PromptRole::Neutral,
            "Balance growth potential against volatility: smaller allocations, staged \
             entries and diversification within crypto exposure.",
        ),
        (
            PromptRole::RiskJudge,
            "Factor in round-the-clock trading and the absence of circuit breakers when \
             setting the final position size.",
        ),
    ],
};

/// Well-known crypto tickers.
const CRYPTO_SYMBOLS: &[&str] = &[
    "BTC", "ETH", "USDT", "BNB", "USDC", "XRP", "ADA", "DOGE", "SOL", "TRX", "DOT", "MATIC", "LTC",
    "SHIB", "AVAX", "UNI", "LINK", "XLM", "ATOM", "XMR", "ETC", "BCH", "APT", "FIL", "ALGO",
    "HBAR", "QNT", "LDO",
];

/// Tickers shared with listed equities. Always classified as stock so stock
/// data is never misrouted.
const AMBIGUOUS_SYMBOLS: &[&str] = &["CRO", "ICP", "VET", "NEAR"];

/// Quote currencies recognised in pair notation (`BTCUSD`, `ETH-USD`, `SOL/USDT`).
const QUOTE_CURRENCIES: &[&str] = &["USDT", "USDC", "USD", "EUR", "BTC"];

/// Heuristic asset classification for a trading symbol.
pub fn classify_symbol(symbol: &str) -> AssetType {
    let upper = symbol.trim().to_ascii_uppercase();
    if AMBIGUOUS_SYMBOLS.contains(&upper.as_str()) {
        return AssetType::Stock;
    }
    if CRYPTO_SYMBOLS.contains(&upper.as_str()) {
        return AssetType::Cryptocurrency;
    }

    let compact: String = upper.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    for quote in QUOTE_CURRENCIES {
        if let Some(base) = compact.strip_suffix(quote) {
            if CRYPTO_SYMBOLS.contains(&base) && base != *quote {
                return AssetType::Cryptocurrency;
            }
        }
    }
    AssetType::Stock
}
