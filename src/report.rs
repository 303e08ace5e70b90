use crate::models::{Persona, RollingAggregate};
use crate::persona::PersonaEstimate;
use crate::projection::{ProjectionSummary, VarianceBand};
use crate::scenario::ScenarioResult;
use crate::summary::{HistoricalOverview, ServiceBreakdown, SummaryReport};
use std::fmt::Display;

pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = format!("{:.2}", value.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((&cents, "00"));
    format!("{sign}${}.{frac}", group_thousands(whole))
}

pub fn format_number(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let sign = if value < 0.0 && rounded != "0" { "-" } else { "" };
    format!("{sign}{}", group_thousands(&rounded))
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Left-aligns the first column and right-aligns the rest.
fn table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(idx) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    push_line(&mut out, &render_line(&widths, header.iter().copied()));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule.join("  "));
    for row in rows {
        push_line(&mut out, &render_line(&widths, row.iter().map(String::as_str)));
    }
    out
}

fn render_line<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let parts: Vec<String> = cells
        .enumerate()
        .map(|(idx, cell)| {
            let w = widths.get(idx).copied().unwrap_or(0);
            if idx == 0 {
                format!("{cell:<w$}")
            } else {
                format!("{cell:>w$}")
            }
        })
        .collect();
    parts.join("  ").trim_end().to_string()
}

fn push_line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

/// Writes an indented `label value` line with values in a common column.
fn field(out: &mut String, label: &str, value: impl Display) {
    push_line(out, &format!("  {label:<20}{value}"));
}

fn band_label(band: VarianceBand) -> String {
    format!(
        "{} - {}",
        format_currency(band.lower),
        format_currency(band.upper)
    )
}

fn breakdown_rows(services: &[ServiceBreakdown]) -> Vec<Vec<String>> {
    services
        .iter()
        .map(|s| {
            vec![
                s.service_type.clone(),
                format_number(s.total_credits),
                format_currency(s.total_cost_usd),
                format!("{:.1}%", s.pct_of_total),
                format_number(s.avg_daily_users),
                format_number(s.total_operations as f64),
            ]
        })
        .collect()
}

const BREAKDOWN_HEADER: [&str; 6] = [
    "Service",
    "Credits",
    "Cost",
    "Share",
    "Avg Users",
    "Operations",
];

pub fn render_history(view: &HistoricalOverview) -> String {
    let mut out = String::new();
    push_line(&mut out, "Historical Usage");
    field(&mut out, "Total credits:", format_number(view.total_credits));
    field(&mut out, "Total cost:", format_currency(view.total_cost));
    field(&mut out, "Avg daily credits:", format_number(view.avg_daily_credits));
    field(&mut out, "Avg daily users:", format_number(view.avg_daily_users));
    out.push('\n');
    out.push_str(&table(&BREAKDOWN_HEADER, &breakdown_rows(&view.services)));
    out
}

pub fn render_rolling(title: &str, aggregates: &[RollingAggregate]) -> String {
    let rows: Vec<Vec<String>> = aggregates
        .iter()
        .map(|a| {
            vec![
                a.service_type.clone(),
                a.date.to_string(),
                a.window_len.to_string(),
                format!("{:.2}", a.credits_30d_total),
                format_number(a.operations_30d_total as f64),
                format!("{:.1}", a.users_30d_avg),
                format!("{:.4}", a.cost_per_user_30d),
            ]
        })
        .collect();
    let mut out = String::new();
    push_line(&mut out, title);
    out.push_str(&table(
        &[
            "Service",
            "As of",
            "Records",
            "Credits",
            "Operations",
            "Avg Users",
            "Credits/User",
        ],
        &rows,
    ));
    out
}

pub fn render_projection(p: &ProjectionSummary, variance: f64) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        &format!(
            "Cost Projection ({} months at {:.0}% monthly growth)",
            p.months,
            p.growth_rate * 100.0
        ),
    );
    field(&mut out, "Month 1 cost:", format_currency(p.first_month_cost));
    field(
        &mut out,
        &format!("Month {} cost:", p.months),
        format_currency(p.final_month_cost),
    );
    field(&mut out, "Total cost:", format_currency(p.total_cost));
    field(
        &mut out,
        &format!("Variance (±{:.0}%):", variance * 100.0),
        band_label(p.band),
    );
    out.push('\n');
    let rows: Vec<Vec<String>> = p
        .monthly
        .iter()
        .map(|m| {
            vec![
                m.month.to_string(),
                format_currency(m.cost_usd),
                format_currency(m.band.lower),
                format_currency(m.band.upper),
            ]
        })
        .collect();
    out.push_str(&table(&["Month", "Projected", "Lower", "Upper"], &rows));
    out
}

pub fn render_scenarios(results: &[ScenarioResult], months: u32) -> String {
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            vec![
                format!("{} ({:.0}%)", r.label, r.rate * 100.0),
                format_currency(r.final_month_cost),
                format_currency(r.total_cost),
            ]
        })
        .collect();
    let final_header = format!("Month {months} Cost");
    let mut out = String::from("Scenario Comparison\n");
    out.push_str(&table(&["Scenario", &final_header, "Total Cost"], &rows));
    out
}

pub fn render_summary(r: &SummaryReport, variance: f64) -> String {
    let mut out = String::new();
    push_line(&mut out, "Current State");
    field(&mut out, "Analysis period:", format!("{} days", r.days_of_data));
    field(&mut out, "Total cost:", format_currency(r.total_cost));
    field(&mut out, "Avg daily cost:", format_currency(r.avg_daily_cost));
    field(&mut out, "Total credits:", format_number(r.total_credits));
    field(&mut out, "Active services:", r.active_services);
    field(&mut out, "Avg daily users:", format_number(r.avg_daily_users));
    out.push('\n');
    push_line(
        &mut out,
        &format!(
            "{}-Month Projection ({:.0}% Growth)",
            r.projection.months,
            r.projection.growth_rate * 100.0
        ),
    );
    field(&mut out, "Projected cost:", format_currency(r.projection.total_cost));
    field(
        &mut out,
        &format!("Range (±{:.0}%):", variance * 100.0),
        band_label(r.projection.band),
    );
    field(&mut out, "Avg monthly cost:", format_currency(r.projection.avg_monthly_cost));
    out.push('\n');
    out.push_str(&table(&BREAKDOWN_HEADER, &breakdown_rows(&r.services)));
    out
}

pub fn render_roster(personas: &[Persona]) -> String {
    let rows: Vec<Vec<String>> = personas
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.user_count.to_string(),
                p.requests_per_day.to_string(),
            ]
        })
        .collect();
    table(&["Persona", "Users", "Requests/Day"], &rows)
}

pub fn render_personas(est: &PersonaEstimate) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        &format!(
            "Avg cost per request: ${:.6} ({})",
            est.unit_cost.avg_cost_per_request,
            est.unit_cost.basis.as_label()
        ),
    );
    out.push('\n');
    let rows: Vec<Vec<String>> = est
        .personas
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                p.user_count.to_string(),
                p.requests_per_day.to_string(),
                format_number(p.monthly_requests),
                format_currency(p.cost_per_user_monthly),
                format_currency(p.total_cost_monthly),
            ]
        })
        .collect();
    out.push_str(&table(
        &[
            "Persona",
            "Users",
            "Requests/Day",
            "Requests/Month",
            "Cost/User",
            "Total/Month",
        ],
        &rows,
    ));
    out.push('\n');
    field(&mut out, "Total users:", est.total_users);
    field(&mut out, "Monthly requests:", format_number(est.total_monthly_requests));
    field(&mut out, "Monthly cost:", format_currency(est.total_monthly_cost));
    field(&mut out, "Avg cost per user:", format_currency(est.avg_cost_per_user));
    out
}
