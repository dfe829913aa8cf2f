use engine_core::Banner;
use serde::{Deserialize, Serialize};

/// The six pre-trade checks a trader ticks off before sizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItems {
    pub from_preset: bool,
    pub trend_pass: bool,
    pub liquidity_pass: bool,
    pub tv_confirm: bool,
    pub earnings_ok: bool,
    pub journal_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistEvaluation {
    pub banner: Banner,
    pub missing_count: i64,
    pub missing_items: Vec<&'static str>,
}

impl ChecklistItems {
    pub fn all_checked() -> Self {
        Self {
            from_preset: true,
            trend_pass: true,
            liquidity_pass: true,
            tv_confirm: true,
            earnings_ok: true,
            journal_ok: true,
        }
    }

    fn named(&self) -> [(&'static str, bool); 6] {
        [
            ("FromPreset", self.from_preset),
            ("TrendPass", self.trend_pass),
            ("LiquidityPass", self.liquidity_pass),
            ("TVConfirm", self.tv_confirm),
            ("EarningsOK", self.earnings_ok),
            ("JournalOK", self.journal_ok),
        ]
    }

    /// 0 missing is GREEN, 1 is YELLOW, 2 or more is RED.
    pub fn evaluate(&self) -> ChecklistEvaluation {
        let missing_items: Vec<&'static str> = self
            .named()
            .into_iter()
            .filter(|(_, checked)| !checked)
            .map(|(name, _)| name)
            .collect();

        let banner = match missing_items.len() {
            0 => Banner::Green,
            1 => Banner::Yellow,
            _ => Banner::Red,
        };

        ChecklistEvaluation {
            banner,
            missing_count: missing_items.len() as i64,
            missing_items,
        }
    }
}
