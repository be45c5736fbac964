use comfy_table::{presets::NOTHING, *};

use samort::pipeline::RunSummary;
use samort::record::Target;

pub fn display_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Subnational rows").add_attribute(Attribute::Bold),
            Cell::new("City rows").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ])
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');

    for report in &summary.sources {
        let rows_for = |target: Target| {
            report
                .rows
                .iter()
                .find(|(t, _)| *t == target)
                .map(|(_, n)| n.to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        table.add_row(vec![
            report.source.to_string(),
            rows_for(Target::Subnational),
            rows_for(Target::Cities),
            report
                .error
                .clone()
                .unwrap_or_else(|| "ok".to_string()),
        ]);
    }
    println!("\n{}", table);

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Table").add_attribute(Attribute::Bold),
            Cell::new("Rows merged").add_attribute(Attribute::Bold),
        ])
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');

    for report in &summary.tables {
        table.add_row(vec![report.target.table_name(), report.rows.to_string()]);
    }
    println!("\n{}", table);
}
