// Report builder: summary lines, degraded entries, chart series, CSV attachment

mod common;

use cfstats_agent::analyzer::evaluate;
use cfstats_agent::report::{compose, ChartRenderer, CsvChartRenderer, ServiceOutcome};
use cfstats_agent::types::{ServiceKind, Severity};
use common::*;

fn outcomes() -> Vec<ServiceOutcome> {
    let blog = target(ServiceKind::Page, "blog");
    let api = target(ServiceKind::Worker, "api");
    let shop = target(ServiceKind::Page, "shop");
    let t = thresholds(30.0, 80.0, 1);

    let blog_history = vec![
        entry(0, record(&blog, at(17, 8), 900)),
        entry(1, record(&blog, at(18, 8), 1000)),
    ];
    let blog_result = evaluate(&record(&blog, at(19, 8), 1500), &blog_history, &t);
    let api_result = evaluate(&record(&api, at(19, 8), 200), &[], &t);

    vec![
        ServiceOutcome::Analyzed {
            result: blog_result,
            history: blog_history,
        },
        ServiceOutcome::Unavailable {
            service: shop,
            reason: "fetch for page:shop failed after 3 attempt(s): server error (HTTP 502)".into(),
        },
        ServiceOutcome::Analyzed {
            result: api_result,
            history: vec![],
        },
    ]
}

#[test]
fn summary_follows_input_order() {
    let report = compose(&outcomes(), at(19, 8));

    assert_eq!(report.summary.len(), 3);
    assert!(report.summary[0].contains("blog"));
    assert!(report.summary[1].contains("shop"));
    assert!(report.summary[2].contains("api"));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn lines_carry_counts_changes_and_severity() {
    let report = compose(&outcomes(), at(19, 8));

    assert_eq!(
        report.summary[0],
        "📄 blog (page): 1,500 requests, +50.0% vs 1,000 ⚠️ NOTABLE"
    );
    assert_eq!(
        report.summary[1],
        "❌ shop (page): data unavailable: fetch for page:shop failed after 3 attempt(s): server error (HTTP 502)"
    );
    assert_eq!(report.summary[2], "💻 api (worker): 200 requests, no baseline for comparison");
    assert_eq!(report.results[1].severity, Severity::NoBaseline);
}

#[test]
fn rendered_text_lists_successes_failures_and_missing_baselines() {
    let text = compose(&outcomes(), at(19, 8)).render_text();

    assert!(text.starts_with("📊 Cloudflare request report - 2026-10-19 08:00 UTC"));
    assert!(text.contains("data unavailable"));
    assert!(text.contains("no baseline for comparison"));
    assert!(text.ends_with("✅ 2 ok | ❌ 1 unavailable | ⚪ 1 without baseline | ⚠️ 1 alert(s)"));
}

#[test]
fn chart_series_skip_services_without_history() {
    let report = compose(&outcomes(), at(19, 8));

    assert_eq!(report.chart_series.len(), 1);
    let series = &report.chart_series[0];
    assert_eq!(series.service.name, "blog");
    let counts: Vec<u64> = series.points.iter().map(|p| p.request_count).collect();
    assert_eq!(counts, vec![900, 1000, 1500]);
    assert!(series.points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn csv_renderer_emits_one_row_per_point() {
    let report = compose(&outcomes(), at(19, 8));
    let file = CsvChartRenderer.render(&report).unwrap();

    assert_eq!(file.file_name, "requests-20261019-0800.csv");
    assert_eq!(file.mime_type, "text/csv");
    let csv = String::from_utf8(file.bytes).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows[0], "timestamp,service,requests");
    assert_eq!(rows[1], "2026-10-17T08:00:00Z,page:blog,900");
    assert_eq!(rows.len(), 4);
}

#[test]
fn csv_renderer_rejects_empty_chart() {
    let api = target(ServiceKind::Worker, "api");
    let result = evaluate(&record(&api, at(19, 8), 5), &[], &thresholds(30.0, 80.0, 1));
    let report = compose(&[ServiceOutcome::Analyzed { result, history: vec![] }], at(19, 8));

    assert!(report.chart_series.is_empty());
    assert!(CsvChartRenderer.render(&report).is_err());
}
