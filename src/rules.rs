use crate::access::RowRef;
use crate::coerce::{SyncPolarity, ACOS_NOT_APPLICABLE};
use crate::columns::*;

pub const MIN_BID: f64 = 0.02;
pub const AGENCY_BID_THRESHOLD: f64 = 0.2;
pub const AGENCY_ACOS_CEILING: f64 = 0.35;
pub const PORTAL_BID_GAP: f64 = 0.26;
pub const TOS_LOW_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleFamily {
    Agency,
    Portal,
    DesirableAcos,
}

impl RuleFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleFamily::Agency => "agency",
            RuleFamily::Portal => "portal",
            RuleFamily::DesirableAcos => "desirable_acos",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "agency" => Some(RuleFamily::Agency),
            "portal" => Some(RuleFamily::Portal),
            "desirable_acos" => Some(RuleFamily::DesirableAcos),
            _ => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RuleFamily::Agency => "Agency",
            RuleFamily::Portal => "Portal",
            RuleFamily::DesirableAcos => "Desirable ACOS",
        }
    }

    fn gate(self, row: &RowRef<'_>) -> bool {
        match self {
            RuleFamily::Agency | RuleFamily::Portal => true,
            RuleFamily::DesirableAcos => desirable_acos_gate(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Overbidding,
    Underbidding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    BidIncrease,
}

impl Ranking {
    pub fn score(self, row: &RowRef<'_>) -> f64 {
        match self {
            Ranking::BidIncrease => row.num(CPC_PERIOD_2) - row.num(CPC_PERIOD_1),
        }
    }
}

pub struct Rule {
    pub id: &'static str,
    pub family: RuleFamily,
    pub polarity: SyncPolarity,
    pub direction: Direction,
    pub description: &'static str,
    pub columns: &'static [&'static str],
    pub ranking: Option<Ranking>,
    body: fn(&RowRef<'_>) -> bool,
}

impl Rule {
    pub fn matches(&self, row: &RowRef<'_>) -> bool {
        self.polarity.admits(row.get(SYNC_STATUS)) && self.family.gate(row) && (self.body)(row)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("polarity", &self.polarity)
            .finish_non_exhaustive()
    }
}

/// `(ACOS computable and under target) or (not computable and spend under target × price)`.
pub fn desirable_acos_gate(row: &RowRef<'_>) -> bool {
    let applied = row.num(APPLIED_ACOS);
    let target = row.num(TARGET_ACOS);
    (applied < ACOS_NOT_APPLICABLE && applied < target)
        || (applied == ACOS_NOT_APPLICABLE && row.num(AD_SPEND) < target * row.num(PRICE))
}

fn spend_budget(row: &RowRef<'_>) -> f64 {
    row.num(TARGET_ACOS) * row.num(PRICE)
}

fn bid_delta(row: &RowRef<'_>) -> f64 {
    row.num(LATEST_BID) - row.num(PREVIOUS_BID)
}

const SPEND_RULE_COLUMNS: &[&str] = &[APPLIED_ACOS, AD_SPEND, TARGET_ACOS, PRICE];

pub static RULES: &[Rule] = &[
    Rule {
        id: "agency_underbidding_1",
        family: RuleFamily::Agency,
        polarity: SyncPolarity::Agency,
        direction: Direction::Underbidding,
        description: "No ACOS, no spend, no top-of-search share, bid below Amazon's minimum suggestion",
        columns: &[APPLIED_ACOS, AD_SPEND, TOS_PCT, MIN_SUGGESTED_BID, CURRENT_BID],
        ranking: None,
        body: |r| {
            r.num(APPLIED_ACOS) == ACOS_NOT_APPLICABLE
                && r.num(AD_SPEND) == 0.0
                && r.num(TOS_PCT) <= 0.0
                && r.num(MIN_SUGGESTED_BID) > r.num(CURRENT_BID)
        },
    },
    Rule {
        id: "agency_overbidding_1",
        family: RuleFamily::Agency,
        polarity: SyncPolarity::Agency,
        direction: Direction::Overbidding,
        description: "ACOS already under target while the manual bid stays above $0.20",
        columns: &[APPLIED_ACOS, TARGET_ACOS, CURRENT_BID],
        ranking: Some(Ranking::BidIncrease),
        body: |r| {
            let applied = r.num(APPLIED_ACOS);
            applied < ACOS_NOT_APPLICABLE
                && applied < r.num(TARGET_ACOS)
                && r.num(CURRENT_BID) > AGENCY_BID_THRESHOLD
        },
    },
    Rule {
        id: "agency_overbidding_2",
        family: RuleFamily::Agency,
        polarity: SyncPolarity::Agency,
        direction: Direction::Overbidding,
        description: "No ACOS yet spend exceeds target ACOS × price with the bid above $0.20",
        columns: &[APPLIED_ACOS, AD_SPEND, TARGET_ACOS, PRICE, CURRENT_BID],
        ranking: Some(Ranking::BidIncrease),
        body: |r| {
            r.num(APPLIED_ACOS) == ACOS_NOT_APPLICABLE
                && r.num(AD_SPEND) > spend_budget(r)
                && r.num(CURRENT_BID) > AGENCY_BID_THRESHOLD
        },
    },
    Rule {
        id: "agency_overbidding_3",
        family: RuleFamily::Agency,
        polarity: SyncPolarity::Agency,
        direction: Direction::Overbidding,
        description: "ACOS above 35% with the manual bid above $0.20",
        columns: &[APPLIED_ACOS, CURRENT_BID],
        ranking: Some(Ranking::BidIncrease),
        body: |r| {
            let applied = r.num(APPLIED_ACOS);
            applied < ACOS_NOT_APPLICABLE
                && applied > AGENCY_ACOS_CEILING
                && r.num(CURRENT_BID) > AGENCY_BID_THRESHOLD
        },
    },
    Rule {
        id: "portal_overbidding_1",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Portal,
        direction: Direction::Overbidding,
        description: "ACOS above target while the system bid stays above the $0.02 floor",
        columns: &[APPLIED_ACOS, TARGET_ACOS, LATEST_BID],
        ranking: Some(Ranking::BidIncrease),
        body: |r| {
            let applied = r.num(APPLIED_ACOS);
            applied < ACOS_NOT_APPLICABLE
                && applied > r.num(TARGET_ACOS)
                && r.num(LATEST_BID) > MIN_BID
        },
    },
    Rule {
        id: "portal_overbidding_2",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Portal,
        direction: Direction::Overbidding,
        description: "No ACOS yet spend exceeds target ACOS × price with the system bid above the floor",
        columns: SPEND_RULE_COLUMNS,
        ranking: Some(Ranking::BidIncrease),
        body: |r| {
            r.num(APPLIED_ACOS) == ACOS_NOT_APPLICABLE
                && r.num(AD_SPEND) > spend_budget(r)
                && r.num(LATEST_BID) > MIN_BID
        },
    },
    Rule {
        id: "portal_underbidding_1",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Portal,
        direction: Direction::Underbidding,
        description: "ACOS under target but the system bid sits on the $0.02 floor",
        columns: &[APPLIED_ACOS, TARGET_ACOS, LATEST_BID],
        ranking: None,
        body: |r| {
            let applied = r.num(APPLIED_ACOS);
            applied < ACOS_NOT_APPLICABLE
                && applied < r.num(TARGET_ACOS)
                && r.num(LATEST_BID) == MIN_BID
        },
    },
    Rule {
        id: "portal_underbidding_2",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Portal,
        direction: Direction::Underbidding,
        description: "No ACOS, spend under target ACOS × price, system bid on the floor",
        columns: SPEND_RULE_COLUMNS,
        ranking: None,
        body: |r| {
            r.num(APPLIED_ACOS) == ACOS_NOT_APPLICABLE
                && r.num(AD_SPEND) < spend_budget(r)
                && r.num(LATEST_BID) == MIN_BID
        },
    },
    Rule {
        id: "portal_underbidding_3",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Portal,
        direction: Direction::Underbidding,
        description: "System bid below Amazon's minimum suggestion and no spend",
        columns: &[MIN_SUGGESTED_BID, LATEST_BID, AD_SPEND],
        ranking: None,
        body: |r| r.num(MIN_SUGGESTED_BID) > r.num(LATEST_BID) && r.num(AD_SPEND) == 0.0,
    },
    // Reads the agency polarity although it sits in the portal family.
    Rule {
        id: "portal_underbidding_4",
        family: RuleFamily::Portal,
        polarity: SyncPolarity::Agency,
        direction: Direction::Underbidding,
        description: "ACOS under target while the live Amazon bid trails the system bid by more than $0.26",
        columns: &[APPLIED_ACOS, TARGET_ACOS, CURRENT_BID, LATEST_BID],
        ranking: None,
        body: |r| {
            r.num(APPLIED_ACOS) < r.num(TARGET_ACOS)
                && (r.num(CURRENT_BID) - r.num(LATEST_BID)) > PORTAL_BID_GAP
        },
    },
    Rule {
        id: "desirable_acos_grp_1",
        family: RuleFamily::DesirableAcos,
        polarity: SyncPolarity::Portal,
        direction: Direction::Underbidding,
        description: "Converting rows whose effective ceiling is pinned at $0.02",
        columns: &[EFFECTIVE_CEILING, CVR],
        ranking: None,
        body: |r| r.num(EFFECTIVE_CEILING) == MIN_BID && r.num(CVR) > 0.0,
    },
    Rule {
        id: "desirable_acos_grp_2",
        family: RuleFamily::DesirableAcos,
        polarity: SyncPolarity::Portal,
        direction: Direction::Underbidding,
        description: "Top-of-search share at or below 50% and the system lowered the bid",
        columns: &[TOS_PCT, LATEST_BID, PREVIOUS_BID],
        ranking: None,
        body: |r| r.num(TOS_PCT) <= TOS_LOW_PCT && bid_delta(r) < 0.0,
    },
    // GRP#3 and GRP#4 read the agency polarity, unlike GRP#1 and GRP#2.
    Rule {
        id: "desirable_acos_grp_3",
        family: RuleFamily::DesirableAcos,
        polarity: SyncPolarity::Agency,
        direction: Direction::Underbidding,
        description: "Top-of-search share at or below 50%, bid unchanged and under its ceiling",
        columns: &[TOS_PCT, LATEST_BID, PREVIOUS_BID, EFFECTIVE_CEILING],
        ranking: None,
        body: |r| {
            r.num(TOS_PCT) <= TOS_LOW_PCT
                && bid_delta(r) == 0.0
                && r.num(LATEST_BID) < r.num(EFFECTIVE_CEILING)
        },
    },
    Rule {
        id: "desirable_acos_grp_4",
        family: RuleFamily::DesirableAcos,
        polarity: SyncPolarity::Agency,
        direction: Direction::Underbidding,
        description: "Converting rows bid below Amazon's minimum suggestion with headroom above the floor",
        columns: &[CVR, LATEST_BID, MIN_SUGGESTED_BID, EFFECTIVE_CEILING],
        ranking: None,
        body: |r| {
            r.num(CVR) > 0.0
                && r.num(LATEST_BID) < r.num(MIN_SUGGESTED_BID)
                && r.num(EFFECTIVE_CEILING) > MIN_BID
        },
    },
];

pub fn find(id: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.id == id)
}

pub fn by_family(family: RuleFamily) -> impl Iterator<Item = &'static Rule> {
    RULES.iter().filter(move |rule| rule.family == family)
}
