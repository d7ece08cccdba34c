use comfy_table::{ContentArrangement, Table};

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

/// Two-column field/value table for single records.
pub fn print_record(rows: Vec<(&str, String)>) {
    print_table(
        &["Field", "Value"],
        rows.into_iter().map(|(k, v)| vec![k.to_string(), v]).collect(),
    );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_pagination(page: i64, per_page: i64, total: i64) {
    let total_pages = (total + per_page - 1) / per_page.max(1);
    println!("Page {} of {} ({} total)", page, total_pages.max(1), total);
}

pub fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or("-".into(), |v| v.to_string())
}

pub fn percent(value: f64) -> String {
    format!("{value:.1}%")
}
