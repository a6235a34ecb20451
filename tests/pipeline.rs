// End-to-end pipeline tests over small synthetic report exports

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pos_cleaner::{
    load_uploaded, validate, AggLevel, DatasetCache, LoadError, Loader, LoaderConfig, Region,
    ReportKind, Severity,
};
use tempfile::{tempdir, TempDir};

const MONTHLY: &str = "\
Stories,Comparative Monthly Sales By Branch,,,
22-Jan-26,,,,
,,,January,February,March,April,May,June,July,August,September
2025,Stories Verdun,100,200,300,400,500,600,700,800,900
,Stories alay,10,20,30,40,50,60,70,80,90
,Total,110,220,330,440,550,660,770,880,990
Page 1 of 2,,,
,,,October,November,December,Total By Year
2025,Stories Verdun,1000,1100,1200,9900
,Stories alay,1,2,3,0
,Total,1001,1102,1203,9900
Copyright OmegaPOS,,,
";

const PRODUCT: &str = "\
Stories,,,,,,,,
Theoretical Profit By Item,,,,,,,,
Product Desc,Qty,Total Price,,Total Cost,Cost %,Total Profit,,Profit %
Stories Verdun,,,,,,,,
TABLE,,,,,,,,
BEVERAGES,,,,,,,,
HOT COFFEE SECTION
Espresso,3,999999999,,400,40,600,,60
Latte,2,500,,200,40,300,,60
Total By Section,5,999999999,,600,40,900,,60
FOOD,,,,,,,,
DONUTS
Glazed,0,0,,0,0,0,,0
Total By Category,0,0,,0,0,0,,0
Stories alay,,,,,,,,
Toters,,,,,,,,
BEVERAGES,,,,,,,,
Tea,1,100,,50,50,50,,50
";

const GROUP: &str = "\
Sales by Items By Group,,,
Description,Barcode,Qty,Total Amount
Branch: Stories Verdun,,,
Division: BAR,,,
Group: HOT DRINKS,,,
Espresso,1001,3,1000
Latte,1002,2,500
Total by Group: HOT DRINKS,,5,1500
Total by Division: BAR,,5,1500
Total by Branch: Stories Verdun,,5,1500
Branch: Stories alay,,,
Division: BAR,,,
Group: TEA,,,
Tea,2001,1,100
";

const CATEGORY: &str = "\
Stories,,,,,,,,
Theoretical Profit By Category,,,,,,,,
Category,Qty,Total Price,,Total Cost,Cost %,Total Profit,,Profit %
Stories Verdun,,,,,,,,
BEVERAGES,5,\"1,500\",,600,40,900,,60
Total By Branch:,5,\"1,500\",,600,40,900,,60
Stories alay,,,,,,,,
BEVERAGES,1,100,,50,50,50,,50
Total By Branch:,1,100,,50,50,50,,50
";

fn report_text(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::MonthlySales => MONTHLY,
        ReportKind::ProductProfitability => PRODUCT,
        ReportKind::SalesByGroup => GROUP,
        ReportKind::CategorySummary => CATEGORY,
    }
}

fn write_reports(dir: &Path) {
    for kind in ReportKind::ALL {
        fs::write(dir.join(kind.file_name()), report_text(kind)).unwrap();
    }
}

fn data_dir() -> TempDir {
    let dir = tempdir().unwrap();
    write_reports(dir.path());
    dir
}

fn loader(data: &Path, cache: &Path) -> Loader {
    Loader::new(
        LoaderConfig::default()
            .with_data_dir(data)
            .with_cache_dir(cache),
    )
}

#[test]
fn test_directory_load_builds_all_tables() {
    let data = data_dir();
    let cache = tempdir().unwrap();
    let dataset = loader(data.path(), cache.path()).load().unwrap();

    // Monthly: two branch-years, "Total" pseudo-branch dropped
    assert_eq!(dataset.monthly_sales.len(), 2);
    let verdun = &dataset.monthly_sales[0];
    assert_eq!(verdun.branch, "Stories Verdun");
    assert_eq!(verdun.months[0], 100.0);
    assert_eq!(verdun.months[9], 1000.0);
    assert_eq!(verdun.months[10], 1100.0);
    assert_eq!(verdun.months[11], 1200.0);
    assert_eq!(verdun.total_by_year, 9900.0);
    assert!(!verdun.total_recomputed);

    let aley = &dataset.monthly_sales[1];
    assert_eq!(aley.branch, "Stories Aley");
    assert_eq!(aley.branch_raw, "Stories alay");
    assert_eq!(aley.region, Region::Mountains);
    assert!(aley.total_recomputed);
    assert_eq!(aley.total_by_year, aley.month_sum());

    // Product: the all-zero item is dropped, the all-zero subtotal is kept
    let products = &dataset.product_profitability;
    assert_eq!(products.len(), 5);
    let espresso = &products[0];
    assert_eq!(espresso.product, "Espresso");
    assert_eq!(espresso.service_type.as_deref(), Some("TABLE"));
    assert_eq!(espresso.category.as_deref(), Some("BEVERAGES"));
    assert_eq!(espresso.section.as_deref(), Some("HOT COFFEE SECTION"));
    assert_eq!(espresso.true_revenue, 1000.0);
    assert_eq!(products[1].true_revenue, 500.0);
    assert!(products[2].is_aggregate);
    assert_eq!(products[2].true_revenue, 1500.0);

    let tea = &products[4];
    assert_eq!(tea.branch.as_deref(), Some("Stories Aley"));
    assert_eq!(tea.service_type.as_deref(), Some("Toters"));
    assert_eq!(tea.section, None);

    // Group: aggregate levels tagged
    let groups = &dataset.sales_by_group;
    assert_eq!(groups.len(), 6);
    assert_eq!(groups[2].agg_level, Some(AggLevel::Group));
    assert_eq!(groups[4].agg_level, Some(AggLevel::Branch));
    assert_eq!(groups[5].group.as_deref(), Some("TEA"));

    // Category: totals relabeled
    let categories = &dataset.category_summary;
    assert_eq!(categories.len(), 4);
    assert_eq!(categories[1].category, "TOTAL");
    assert_eq!(categories[0].total_price, 1500.0);
}

#[test]
fn test_aggregate_revenue_is_cost_plus_profit() {
    let data = data_dir();
    let dataset = Loader::default().parse_dir(data.path()).unwrap();

    for row in dataset.product_profitability.iter().filter(|r| r.is_aggregate) {
        assert!((row.true_revenue - (row.total_cost + row.total_profit)).abs() < 1e-9);
    }
    for row in &dataset.category_summary {
        assert!((row.true_revenue - (row.total_cost + row.total_profit)).abs() < 1e-9);
    }
}

#[test]
fn test_cache_round_trip_matches_fresh_parse() {
    let data = data_dir();
    let cache = tempdir().unwrap();
    let loader = loader(data.path(), cache.path());

    let fresh = Loader::default().parse_dir(data.path()).unwrap();
    let first = loader.load().unwrap();
    let cached = loader.load().unwrap();

    assert_eq!(first, fresh);
    assert_eq!(cached, fresh);

    let entry = fs::read_dir(cache.path()).unwrap().next().unwrap().unwrap().path();
    for kind in ReportKind::ALL {
        assert!(entry.join(format!("{}.parquet", kind.table_name())).is_file());
    }
    assert!(entry.join("manifest.json").is_file());
}

#[test]
fn test_upload_routing_ignores_surrounding_text() {
    let files = vec![
        ("2025-final_REP_S_00134_SMRY (3).csv".to_string(), MONTHLY.as_bytes()),
        ("upload-rep_s_00014_SMRY.CSV".to_string(), PRODUCT.as_bytes()),
        ("rep_s_00191_SMRY-3.csv.bak".to_string(), GROUP.as_bytes()),
        ("Copy of rep_s_00673_SMRY.csv".to_string(), CATEGORY.as_bytes()),
    ];

    let uploaded = load_uploaded(files).unwrap();
    let data = data_dir();
    let from_dir = Loader::default().parse_dir(data.path()).unwrap();

    assert_eq!(uploaded, from_dir);
}

#[test]
fn test_missing_file_is_data_not_found() {
    let data = data_dir();
    fs::remove_file(data.path().join(ReportKind::SalesByGroup.file_name())).unwrap();
    let cache = tempdir().unwrap();

    let err = loader(data.path(), cache.path()).load().unwrap_err();

    assert!(matches!(
        err.downcast_ref::<LoadError>(),
        Some(LoadError::ReportNotFound {
            kind: ReportKind::SalesByGroup,
            ..
        })
    ));
    assert!(err.to_string().contains("data not found"));
}

#[test]
fn test_missing_directory_is_data_not_found() {
    let base = tempdir().unwrap();
    let cache = tempdir().unwrap();

    let err = loader(&base.path().join("nope"), cache.path()).load().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LoadError>(),
        Some(LoadError::DataDirNotFound { .. })
    ));
}

#[test]
fn test_memoized_dataset_reloads_after_invalidation() {
    let data = data_dir();
    let cache = tempdir().unwrap();
    let stale = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stale);

    let memo = DatasetCache::new(loader(data.path(), cache.path()))
        .with_invalidation_hook(move || flag.swap(false, Ordering::SeqCst));

    let before = memo.get_or_load().unwrap();
    assert_eq!(before.sales_by_group.len(), 6);

    fs::write(
        data.path().join(ReportKind::SalesByGroup.file_name()),
        format!("{}Chai,2002,1,80\n", GROUP),
    )
    .unwrap();

    // Still memoized until someone says otherwise
    assert_eq!(memo.get_or_load().unwrap().sales_by_group.len(), 6);

    stale.store(true, Ordering::SeqCst);
    assert_eq!(memo.get_or_load().unwrap().sales_by_group.len(), 7);

    fs::write(data.path().join(ReportKind::SalesByGroup.file_name()), GROUP).unwrap();
    memo.invalidate();
    assert_eq!(memo.get_or_load().unwrap().sales_by_group.len(), 6);
}

#[test]
fn test_validation_of_clean_exports() {
    let data = data_dir();
    let dataset = Loader::default().parse_dir(data.path()).unwrap();
    let report = validate(&dataset);

    assert!(!report.has_critical_issues());
    assert_eq!(report.count(Severity::Warning), 0);
    assert!(report.branch_consistency.is_consistent());

    let monthly = report.table(ReportKind::MonthlySales).unwrap();
    assert_eq!(monthly.rows, 2);
    assert_eq!(
        monthly.unique_branches,
        vec!["Stories Aley".to_string(), "Stories Verdun".to_string()]
    );
    assert!(monthly.columns.contains(&"Total_By_Year".to_string()));

    let products = report.table(ReportKind::ProductProfitability).unwrap();
    assert_eq!(products.null_counts["Branch"], 0);
    assert_eq!(products.null_counts["ServiceType"], 0);
    assert!(products.null_counts.contains_key("Section"));
}

#[test]
fn test_unknown_branch_surfaces_in_validation() {
    let data = data_dir();
    let product = format!("{}Stories Tripoli,,,,,,,,\nMocha,1,10,,4,40,6,,60\n", PRODUCT);
    fs::write(data.path().join(ReportKind::ProductProfitability.file_name()), product).unwrap();

    let dataset = Loader::default().parse_dir(data.path()).unwrap();

    // The unknown marker leaves the row under the previous branch
    let mocha = dataset
        .product_profitability
        .iter()
        .find(|r| r.product == "Mocha")
        .unwrap();
    assert_eq!(mocha.branch.as_deref(), Some("Stories Aley"));

    let report = validate(&dataset);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report
        .issues
        .iter()
        .any(|i| i.check == "unrecognized_marker" && i.issue.contains("Stories Tripoli")));
}

#[test]
fn test_rows_serialize_with_source_column_names() {
    let data = data_dir();
    let dataset = Loader::default().parse_dir(data.path()).unwrap();

    let monthly = serde_json::to_value(&dataset.monthly_sales[0]).unwrap();
    assert_eq!(monthly["Total_By_Year"], 9900.0);
    assert_eq!(monthly["Branch_Raw"], "Stories Verdun");
    assert_eq!(monthly["January"], 100.0);
    assert_eq!(monthly["October"], 1000.0);
    assert_eq!(monthly["December"], 1200.0);
    assert!(monthly.get("Months").is_none());

    let product = serde_json::to_value(&dataset.product_profitability[0]).unwrap();
    assert_eq!(product["TrueRevenue"], 1000.0);
    assert_eq!(product["IsAggregate"], false);
}
