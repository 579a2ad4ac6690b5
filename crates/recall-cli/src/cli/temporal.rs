//! `recall parse-date`: show how a time expression resolves.

use anyhow::Result;
use chrono::NaiveDate;
use console::style;

use recall_core::temporal::TemporalParser;
use recall_types::temporal::TemporalFilter;

pub fn parse_date(text: &str, today: Option<NaiveDate>, json: bool) -> Result<()> {
    let parser = match today {
        Some(day) => TemporalParser::with_today(day),
        None => TemporalParser::new(),
    };
    let filter = parser.parse(text);

    if json {
        let output = serde_json::json!({
            "text": text,
            "today": parser.today(),
            "filter": filter,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match filter {
        Some(TemporalFilter::Exact { date }) => {
            println!("  {} {}", style("date").cyan(), date);
        }
        Some(TemporalFilter::Range { from, to }) => {
            println!("  {} {} ~ {}", style("range").cyan(), from, to);
        }
        None => {
            println!("  {} No time expression found", style("i").blue().bold());
        }
    }
    Ok(())
}
