//! Incident report for a completed emergency shutdown.
//!
//! The financial figures are display metrics: the averted loss of a
//! contained leak, less a per-litre penalty for what escaped, set against
//! the cost of the monitoring kit.

use serde::{Deserialize, Serialize};

/// Loss averted by containing a leak, in tenge.
pub const AVERTED_LOSS_TENGE: f64 = 5_400_000.0;
/// Penalty per leaked litre, in tenge.
pub const LOSS_PER_LITRE_TENGE: f64 = 450.0;
/// Cost of the monitoring system the ROI is computed against, in tenge.
pub const SYSTEM_COST_TENGE: f64 = 20_000.0;

pub const FALLBACK_SUMMARY: &str = "Автоматика перекрыла поток. Гидроудар предотвращен.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakEconomics {
    pub saved_tenge: i64,
    pub roi_percent: i64,
}

impl LeakEconomics {
    pub fn from_leak_volume(leak_volume_l: f64) -> Self {
        let saved = (AVERTED_LOSS_TENGE - leak_volume_l * LOSS_PER_LITRE_TENGE).floor();
        let roi = (saved / SYSTEM_COST_TENGE * 100.0).floor();
        Self {
            saved_tenge: saved as i64,
            roi_percent: roi as i64,
        }
    }

    pub fn roi_label(&self) -> String {
        format!("{}%", self.roi_percent)
    }
}

/// Report fields as produced by the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub summary: String,
    #[serde(rename = "finance")]
    pub finance_note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiReport {
    pub summary: String,
    pub finance_note: String,
    pub roi_percent: String,
    /// True when the local heuristic stood in for the completion service.
    pub fallback: bool,
}

impl AiReport {
    pub fn from_draft(draft: ReportDraft, economics: &LeakEconomics) -> Self {
        Self {
            summary: draft.summary,
            finance_note: draft.finance_note,
            roi_percent: economics.roi_label(),
            fallback: false,
        }
    }

    pub fn fallback(economics: &LeakEconomics) -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            finance_note: format!("Экономия: {} ₸", group_thousands(economics.saved_tenge)),
            roi_percent: economics.roi_label(),
            fallback: true,
        }
    }
}

/// Everything the reporting task needs for one shutdown cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    /// Shutdown cycle this request belongs to; results for older cycles are dropped.
    pub generation: u64,
    pub leak_volume_l: f64,
    pub economics: LeakEconomics,
    pub prompt: String,
}

impl ReportRequest {
    pub fn new(generation: u64, leak_volume_l: f64) -> Self {
        let economics = LeakEconomics::from_leak_volume(leak_volume_l);
        let prompt = build_prompt(leak_volume_l, &economics);
        Self {
            generation,
            leak_volume_l,
            economics,
            prompt,
        }
    }
}

pub fn build_prompt(leak_volume_l: f64, economics: &LeakEconomics) -> String {
    format!(
        "Uranium ISR leak. Volume: {:.2}L, Saved: {} Tenge. Task: JSON with \"summary\" and \"finance\" in Russian about reaction time and prevention.",
        leak_volume_l, economics.saved_tenge
    )
}

/// `5398000` -> `5,398,000`.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn economics_for_small_leak() {
        let e = LeakEconomics::from_leak_volume(4.0);
        assert_eq!(e.saved_tenge, 5_398_200);
        assert_eq!(e.roi_percent, 26_991);
        assert_eq!(e.roi_label(), "26991%");
    }

    #[test]
    fn roi_scales_after_dividing_by_cost() {
        // 5_131_800 / 20_000 * 100 lands just under 25_659 in f64
        let e = LeakEconomics::from_leak_volume(596.0);
        assert_eq!(e.saved_tenge, 5_131_800);
        assert_eq!(e.roi_percent, 25_658);
    }

    #[test]
    fn economics_floor_fractional_volume() {
        let e = LeakEconomics::from_leak_volume(1.001);
        // 5_400_000 - 450.45 = 5_399_549.55
        assert_eq!(e.saved_tenge, 5_399_549);
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(5_398_200), "5,398,200");
        assert_eq!(group_thousands(-12_345), "-12,345");
    }

    #[test]
    fn prompt_mentions_volume_and_savings() {
        let req = ReportRequest::new(1, 12.5);
        assert!(req.prompt.contains("Volume: 12.50L"));
        assert!(req
            .prompt
            .contains(&format!("Saved: {} Tenge", req.economics.saved_tenge)));
        assert!(req.prompt.contains("\"summary\" and \"finance\""));
    }

    #[test]
    fn fallback_is_complete() {
        let e = LeakEconomics::from_leak_volume(20.0);
        let report = AiReport::fallback(&e);
        assert!(report.fallback);
        assert_eq!(report.summary, FALLBACK_SUMMARY);
        assert_eq!(report.finance_note, "Экономия: 5,391,000 ₸");
        assert!(report.roi_percent.ends_with('%'));
    }

    #[test]
    fn draft_reads_finance_key() {
        let draft: ReportDraft =
            serde_json::from_str(r#"{"summary":"s","finance":"f"}"#).unwrap();
        assert_eq!(draft.finance_note, "f");
    }
}
