pub const SYNC_STATUS: &str = "Sync Status";
pub const CAMPAIGN: &str = "A: Campaign Name";
pub const AD_GROUP: &str = "B: Ad Group Name";
pub const TARGETING: &str = "C: Keyword / Targeting";
pub const PRICE: &str = "G: Price";
pub const TARGET_ACOS: &str = "H: Target ACOS";
pub const APPLIED_ACOS: &str = "I: Applied ACOS";
pub const AD_SPEND: &str = "J: Ad Spend";
pub const CVR: &str = "K: CVR";
pub const TOS_PCT: &str = "M: TOS%";
pub const MIN_SUGGESTED_BID: &str = "O: Min. Suggested Bid";
pub const CURRENT_BID: &str = "Current Bid As displayed on Amazon Seller Central";
pub const LATEST_BID: &str = "Latest Bid (Calculated by the system)";
pub const PREVIOUS_BID: &str = "Previous Bid (Calculated by the system)";
pub const EFFECTIVE_CEILING: &str = "effective_ceiling";
pub const CVR_WATERFALL_LEVEL: &str = "CVR Waterfall Level";
pub const CPC_PERIOD_1: &str = "CPC (Reporting Period #1)";
pub const CPC_PERIOD_2: &str = "CPC (Reporting Period #2)";
pub const BID_DELTA: &str = "Bid Delta";

pub const REQUIRED_COLUMNS: [&str; 14] = [
    SYNC_STATUS,
    CAMPAIGN,
    AD_GROUP,
    TARGETING,
    PRICE,
    TARGET_ACOS,
    APPLIED_ACOS,
    AD_SPEND,
    CVR,
    TOS_PCT,
    MIN_SUGGESTED_BID,
    CURRENT_BID,
    LATEST_BID,
    PREVIOUS_BID,
];

/// Returns the required columns that no header matches. A header matches
/// when either name contains the other, ignoring case.
pub fn missing_required_columns(headers: &[String]) -> Vec<&'static str> {
    let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();

    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| {
            let required_lower = required.to_lowercase();
            !lowered.iter().any(|header| {
                !header.is_empty()
                    && (header.contains(&required_lower) || required_lower.contains(header.as_str()))
            })
        })
        .collect()
}
