// 🗂️ Sales by Group (rep_s_00191)
//
// Three levels introduced by explicit prefixes:
//   "Branch: ..." → "Division: ..." → "Group: ..." → products
// Subtotals say which level they close ("Total by Group: ...").

use tracing::debug;

use super::{ParsedReport, ReportKind, ReportParser};
use crate::entities::BranchRegistry;
use crate::tables::{AggLevel, GroupRow, Table};
use crate::tokenizer::{parse_number, rest_is_blank, split_line};

const BRANCH_PREFIX: &str = "Branch:";
const DIVISION_PREFIX: &str = "Division:";
const GROUP_PREFIX: &str = "Group:";

const AGGREGATE_PREFIXES: [(&str, AggLevel); 3] = [
    ("Total by Group:", AggLevel::Group),
    ("Total by Division:", AggLevel::Division),
    ("Total by Branch:", AggLevel::Branch),
];

/// Description, Barcode, Qty, Total Amount
const DATA_MIN_FIELDS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupContext {
    pub branch: Option<String>,
    pub division: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupMarker {
    Branch(String),
    Division(String),
    Group(String),
}

impl GroupContext {
    /// Apply a marker, clearing every level below it.
    pub fn apply(&self, marker: GroupMarker) -> GroupContext {
        match marker {
            GroupMarker::Branch(name) => GroupContext {
                branch: Some(name),
                division: None,
                group: None,
            },
            GroupMarker::Division(name) => GroupContext {
                branch: self.branch.clone(),
                division: Some(name),
                group: None,
            },
            GroupMarker::Group(name) => GroupContext {
                group: Some(name),
                ..self.clone()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupFigures {
    pub name: String,
    pub barcode: String,
    pub qty: f64,
    pub total_amount: f64,
    pub agg_level: Option<AggLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupLine {
    Noise,
    Marker(GroupMarker),
    Data(GroupFigures),
    Unrecognized(String),
}

fn strip_label(text: &str, prefix: &str) -> Option<String> {
    text.strip_prefix(prefix).map(|rest| rest.trim().to_string())
}

pub fn classify_line(line: &str) -> GroupLine {
    let line = line.trim();
    if line.is_empty() || super::is_page_stamp(line) || super::is_vendor_footer(line) {
        return GroupLine::Noise;
    }
    if line.starts_with("Description,Barcode")
        || line.starts_with("Stories,,,,")
        || line.starts_with("Sales by Items")
    {
        return GroupLine::Noise;
    }

    let parts = split_line(line);
    let Some(first) = parts.first() else {
        return GroupLine::Noise;
    };

    if let Some(name) = strip_label(first, BRANCH_PREFIX) {
        return GroupLine::Marker(GroupMarker::Branch(name));
    }
    if let Some(name) = strip_label(first, DIVISION_PREFIX) {
        return GroupLine::Marker(GroupMarker::Division(name));
    }
    if let Some(name) = strip_label(first, GROUP_PREFIX) {
        return GroupLine::Marker(GroupMarker::Group(name));
    }

    let agg_level = AGGREGATE_PREFIXES
        .iter()
        .find(|(prefix, _)| first.starts_with(prefix))
        .map(|(_, level)| *level);

    if agg_level.is_none() && !first.is_empty() && rest_is_blank(&parts) {
        return GroupLine::Unrecognized(first.clone());
    }

    if parts.len() < DATA_MIN_FIELDS {
        return GroupLine::Noise;
    }

    let figures = GroupFigures {
        name: first.clone(),
        barcode: parts[1].clone(),
        qty: parse_number(&parts[2]),
        total_amount: parse_number(&parts[3]),
        agg_level,
    };

    if figures.qty == 0.0 && figures.total_amount == 0.0 && figures.agg_level.is_none() {
        return GroupLine::Noise;
    }

    GroupLine::Data(figures)
}

pub struct SalesByGroupParser {
    registry: BranchRegistry,
}

impl SalesByGroupParser {
    pub fn new() -> Self {
        Self::with_registry(BranchRegistry::new())
    }

    pub fn with_registry(registry: BranchRegistry) -> Self {
        SalesByGroupParser { registry }
    }

    pub fn build_row(&self, ctx: &GroupContext, figures: GroupFigures) -> GroupRow {
        let branch = ctx.branch.as_deref().map(|raw| self.registry.normalize(raw));
        let region = self.registry.region_of(branch.as_deref());

        GroupRow {
            branch_raw: ctx.branch.clone(),
            branch,
            region,
            division: ctx.division.clone(),
            group: ctx.group.clone(),
            product: figures.name,
            barcode: figures.barcode,
            qty: figures.qty,
            total_amount: figures.total_amount,
            is_aggregate: figures.agg_level.is_some(),
            agg_level: figures.agg_level,
        }
    }
}

impl Default for SalesByGroupParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser for SalesByGroupParser {
    fn kind(&self) -> ReportKind {
        ReportKind::SalesByGroup
    }

    fn parse_str(&self, content: &str) -> ParsedReport {
        let mut ctx = GroupContext::default();
        let mut rows = Vec::new();
        let mut diagnostics = Vec::new();
        let mut lines_read = 0;

        for (line_idx, raw) in content.lines().enumerate() {
            lines_read += 1;
            match classify_line(raw) {
                GroupLine::Noise => {}
                GroupLine::Marker(marker) => {
                    debug!(?marker, line = line_idx + 1, "group context change");
                    ctx = ctx.apply(marker);
                }
                GroupLine::Data(figures) => rows.push(self.build_row(&ctx, figures)),
                GroupLine::Unrecognized(text) => {
                    diagnostics.push(super::unrecognized_marker(self.kind(), line_idx + 1, &text));
                }
            }
        }

        ParsedReport {
            table: Table::SalesByGroup(rows),
            diagnostics,
            lines_read,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Region;

    fn rows(content: &str) -> Vec<GroupRow> {
        match SalesByGroupParser::new().parse_str(content).table {
            Table::SalesByGroup(rows) => rows,
            other => panic!("unexpected table {:?}", other.kind()),
        }
    }

    #[test]
    fn test_context_cascade() {
        let ctx = GroupContext::default()
            .apply(GroupMarker::Branch("Stories Verdun".into()))
            .apply(GroupMarker::Division("BAR".into()))
            .apply(GroupMarker::Group("HOT DRINKS".into()));
        assert_eq!(ctx.group.as_deref(), Some("HOT DRINKS"));

        let next = ctx.apply(GroupMarker::Division("KITCHEN".into()));
        assert_eq!(next.branch.as_deref(), Some("Stories Verdun"));
        assert_eq!(next.division.as_deref(), Some("KITCHEN"));
        assert_eq!(next.group, None);

        let next = next.apply(GroupMarker::Branch("Stories Zalka".into()));
        assert_eq!(next.division, None);
    }

    #[test]
    fn test_classify_markers() {
        assert_eq!(
            classify_line("Branch: Stories jbeil,,,"),
            GroupLine::Marker(GroupMarker::Branch("Stories jbeil".into()))
        );
        assert_eq!(
            classify_line("Division:BAR"),
            GroupLine::Marker(GroupMarker::Division("BAR".into()))
        );
        assert_eq!(
            classify_line("Group: HOT DRINKS,,,"),
            GroupLine::Marker(GroupMarker::Group("HOT DRINKS".into()))
        );
    }

    #[test]
    fn test_classify_noise() {
        assert_eq!(classify_line("Description,Barcode,Qty,Total Amount"), GroupLine::Noise);
        assert_eq!(classify_line("Stories,,,,"), GroupLine::Noise);
        assert_eq!(classify_line("Sales by Items By Group,,,"), GroupLine::Noise);
        assert_eq!(classify_line("22-Jan-26,,,"), GroupLine::Noise);
        assert_eq!(classify_line("Latte,123,0,0"), GroupLine::Noise);
        assert_eq!(classify_line("Latte,123"), GroupLine::Noise);
    }

    #[test]
    fn test_classify_aggregate_levels() {
        for (line, level) in [
            ("Total by Group: HOT DRINKS,,10,500", AggLevel::Group),
            ("Total by Division: BAR,,10,500", AggLevel::Division),
            ("Total by Branch: Stories Verdun,,0,0", AggLevel::Branch),
        ] {
            match classify_line(line) {
                GroupLine::Data(f) => assert_eq!(f.agg_level, Some(level)),
                other => panic!("expected data for {:?}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_parse_hierarchy() {
        let content = "\
Sales by Items By Group,,,
Description,Barcode,Qty,Total Amount
Branch: Stories sin el fil,,,
Division: BAR,,,
Group: HOT DRINKS,,,
Espresso,1001,10,\"1,500\"
Latte,1002,0,0
Total by Group: HOT DRINKS,,10,1500
Total by Division: BAR,,10,1500
Total by Branch: Stories sin el fil,,10,1500
";
        let rows = rows(content);

        assert_eq!(rows.len(), 4);

        let espresso = &rows[0];
        assert_eq!(espresso.branch_raw.as_deref(), Some("Stories sin el fil"));
        assert_eq!(espresso.branch.as_deref(), Some("Stories Sin El Fil"));
        assert_eq!(espresso.region, Region::GreaterBeirut);
        assert_eq!(espresso.division.as_deref(), Some("BAR"));
        assert_eq!(espresso.group.as_deref(), Some("HOT DRINKS"));
        assert_eq!(espresso.barcode, "1001");
        assert_eq!(espresso.total_amount, 1500.0);
        assert!(!espresso.is_aggregate);
        assert_eq!(espresso.agg_level, None);

        assert_eq!(rows[1].agg_level, Some(AggLevel::Group));
        assert_eq!(rows[2].agg_level, Some(AggLevel::Division));
        assert_eq!(rows[3].agg_level, Some(AggLevel::Branch));
        assert!(rows[3].is_aggregate);
    }

    #[test]
    fn test_unrecognized_marker_reported() {
        let report = SalesByGroupParser::new().parse_str("Branch: Stories Verdun\nSection: ICE,,,\n");
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].text, "Section: ICE");
    }
}
