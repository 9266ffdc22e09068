//! Integration tests for TMDL parsing and model building

use pretty_assertions::assert_eq;
use semguard_core::{DiagnosticCode, TableKind};
use semguard_tmdl::{tokenize, BuilderOptions, Keyword, ModelBuilder};

const SALES: &str = "\
/// Order lines
table Sales
\tlineageTag: 6f1c

\tmeasure 'Total Sales' =
\t\t\tSUMX(
\t\t\t\tSales,
\t\t\t\tSales[Quantity] * Sales[Unit Price]
\t\t\t)
\t\tformatString: \\$#,0.00
\t\tdisplayFolder: Revenue

\t/// Year to date revenue
\tmeasure 'Sales YTD' = TOTALYTD([Total Sales], 'Date'[Date])

\tcolumn OrderId
\t\tdataType: int64
\t\tsummarizeBy: none

\tcolumn DateKey
\t\tdataType: int64
\t\tisHidden

\tcolumn Quantity
\t\tdataType: int64

\tcolumn 'Unit Price'
\t\tdataType: decimal

\tpartition Sales = m
\t\tmode: import
\t\tsource =
\t\t\t\tlet
\t\t\t\t\tSource = Sql.Database(\"srv\", \"db\")
\t\t\t\tin
\t\t\t\t\tSource
";

const DATE: &str = "\
table Date
\tcolumn DateKey
\t\tdataType: int64
\tcolumn Date
\t\tdataType: dateTime
\tcolumn Year = YEAR('Date'[Date])
\t\tdataType: int64

\tpartition Date = calculated
\t\tmode: import
\t\tsource = CALENDARAUTO()
";

const RELATIONSHIPS: &str = "\
relationship 0b5c7e2a-1111-4a3c-9d2f-a1b2c3d4e5f6
\tfromColumn: Sales.DateKey
\ttoColumn: Date.DateKey
";

fn build(files: &[(&str, &str)], external: &[String]) -> semguard_tmdl::BuildOutput {
    let mut builder = ModelBuilder::new(BuilderOptions::default());
    for (path, text) in files {
        builder.add_file(path, text);
    }
    builder.build(external)
}

#[test]
fn sales_and_date_project() {
    let output = build(
        &[
            ("tables/Sales.tmdl", SALES),
            ("tables/Date.tmdl", DATE),
            ("relationships.tmdl", RELATIONSHIPS),
        ],
        &[],
    );
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let model = &output.model;
    assert_eq!(model.table_names(), vec!["Sales", "Date"]);

    let sales = model.find_table("Sales").unwrap();
    assert_eq!(sales.kind, TableKind::Fact);
    assert_eq!(sales.description.as_deref(), Some("Order lines"));

    let columns: Vec<&str> = sales.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["OrderId", "DateKey", "Quantity", "Unit Price"]);
    assert!(sales.columns[1].is_hidden);

    let measures: Vec<&str> = sales.measures.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(measures, vec!["Total Sales", "Sales YTD"]);

    let date = model.find_table("Date").unwrap();
    assert_eq!(date.kind, TableKind::Dimension);
    assert_eq!(date.columns[2].expression.as_deref(), Some("YEAR('Date'[Date])"));
    assert_eq!(date.partitions[0].source_expression.as_deref(), Some("CALENDARAUTO()"));
}

#[test]
fn multiline_measure_is_verbatim_and_properties_survive() {
    let output = build(&[("tables/Sales.tmdl", SALES)], &[]);
    let total = &output.model.tables[0].measures[0];

    assert_eq!(
        total.expression,
        "\t\t\tSUMX(\n\t\t\t\tSales,\n\t\t\t\tSales[Quantity] * Sales[Unit Price]\n\t\t\t)"
    );
    assert_eq!(total.format_string.as_deref(), Some("\\$#,0.00"));
    assert_eq!(total.display_folder.as_deref(), Some("Revenue"));

    let ytd = &output.model.tables[0].measures[1];
    assert_eq!(ytd.description.as_deref(), Some("Year to date revenue"));
}

#[test]
fn generated_tables_keep_count_and_order() {
    let columns = 25;
    let measures = 12;

    let mut text = String::from("table Wide\n");
    for i in 0..columns {
        text.push_str(&format!("\tcolumn Col{:02}\n\t\tdataType: string\n", i));
    }
    for i in 0..measures {
        text.push_str(&format!("\tmeasure M{:02} =\n\t\t\t[M{:02}] + 1\n\n", i, i + 1));
    }

    let output = build(&[("wide.tmdl", &text)], &[]);
    let wide = &output.model.tables[0];

    assert_eq!(wide.columns.len(), columns);
    assert_eq!(wide.measures.len(), measures);
    assert!(wide.columns.windows(2).all(|w| w[0].name < w[1].name));
    assert!(wide.measures.windows(2).all(|w| w[0].name < w[1].name));
    assert_eq!(wide.measures[0].reference_count, 0);
    assert_eq!(wide.measures[5].reference_count, 1);
}

#[test]
fn truncated_measure_recovers_at_next_table() {
    let text = "\
table Sales
\tcolumn Amount
\tmeasure Broken = ```
\t\tSUM(Sales[Amount])
\tmeasure Lost = 1

table Customer
\tcolumn Id
";
    let output = build(&[("model.tmdl", text)], &[]);

    assert_eq!(output.model.table_names(), vec!["Sales", "Customer"]);
    assert!(output.model.tables[0].measures.is_empty());
    assert_eq!(output.model.tables[1].columns[0].name, "Id");

    let codes: Vec<DiagnosticCode> = output.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::ParseMalformedBlock]);
    assert_eq!(output.diagnostics[0].object.as_deref(), Some("Broken"));
}

#[test]
fn external_references_mark_measures_used() {
    let visual = r#"{"visual": {"query": {"Select": [{"Name": "Sales.Sales YTD", "NativeReferenceName": "[Sales YTD]"}]}}}"#;

    let without = build(&[("tables/Sales.tmdl", SALES)], &[]);
    let with = build(&[("tables/Sales.tmdl", SALES)], &[visual.to_string()]);

    assert_eq!(without.model.tables[0].measures[1].reference_count, 0);
    assert_eq!(with.model.tables[0].measures[1].reference_count, 1);
    assert_eq!(with.model.tables[0].measures[0].reference_count, 1);
}

#[test]
fn tokenizer_emits_parents_before_children() {
    let keywords: Vec<Keyword> = tokenize(DATE).into_iter().map(|b| b.keyword).collect();
    assert_eq!(
        keywords,
        vec![
            Keyword::Table,
            Keyword::Column,
            Keyword::Column,
            Keyword::Column,
            Keyword::Partition,
        ]
    );
}
