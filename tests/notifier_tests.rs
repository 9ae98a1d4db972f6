// Notifier: retry, exhaustion, splitting, attachments, channel isolation

mod common;

use cfstats_agent::alerter::{MessageChannel, Notifier};
use cfstats_agent::analyzer::evaluate;
use cfstats_agent::error::SendError;
use cfstats_agent::report::{compose, CsvChartRenderer, Report, ServiceOutcome};
use cfstats_agent::retry::RetryPolicy;
use cfstats_agent::types::ServiceKind;
use common::*;

fn report(services: usize) -> Report {
    let t = thresholds(30.0, 80.0, 1);
    let outcomes: Vec<ServiceOutcome> = (0..services)
        .map(|i| {
            let svc = target(ServiceKind::Page, &format!("site-{i}"));
            let history = vec![entry(0, record(&svc, at(18, 8), 100))];
            let result = evaluate(&record(&svc, at(19, 8), 150), &history, &t);
            ServiceOutcome::Analyzed { result, history }
        })
        .collect();
    compose(&outcomes, at(19, 8))
}

fn boxed(channel: impl MessageChannel + 'static) -> Box<dyn MessageChannel> {
    Box::new(channel)
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let (channel, log) = FakeChannel::new("fake", 4096);
    let channel = channel.failing(2, SendError::RateLimited);
    let notifier = Notifier::new(vec![boxed(channel)], RetryPolicy::immediate(3));

    let ack = notifier.send(&report(2)).await.unwrap();

    assert_eq!(ack.channels, vec!["fake".to_string()]);
    assert_eq!(ack.messages, 1);
    assert_eq!(log.attempts(), 3);
    assert_eq!(log.sent().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_yield_delivery_error() {
    let (channel, log) = FakeChannel::new("fake", 4096);
    let channel = channel.failing(u32::MAX, SendError::Transport("timed out".into()));
    let notifier = Notifier::new(vec![boxed(channel)], RetryPolicy::immediate(4));

    let err = notifier.send(&report(1)).await.unwrap_err();

    assert_eq!(err.channel, "fake");
    assert_eq!(err.attempts, 4);
    assert_eq!(err.cause, SendError::Transport("timed out".into()));
    assert_eq!(log.attempts(), 4);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (channel, log) = FakeChannel::new("fake", 4096);
    let channel = channel.failing(
        u32::MAX,
        SendError::Status {
            status: 400,
            body: "chat not found".into(),
        },
    );
    let notifier = Notifier::new(vec![boxed(channel)], RetryPolicy::immediate(5));

    let err = notifier.send(&report(1)).await.unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(log.attempts(), 1);
}

#[tokio::test]
async fn long_reports_are_split_to_the_channel_limit() {
    let (channel, log) = FakeChannel::new("small", 120);
    let notifier = Notifier::new(vec![boxed(channel)], RetryPolicy::immediate(1));
    let report = report(10);

    let ack = notifier.send(&report).await.unwrap();

    let sent = log.sent();
    assert!(sent.len() > 1);
    assert_eq!(ack.messages, sent.len());
    assert!(sent.iter().all(|m| m.chars().count() <= 120));
    // Lines are never broken across messages.
    for line in &report.summary {
        assert!(sent.iter().any(|m| m.lines().any(|l| l == line)), "line split: {line}");
    }
}

#[tokio::test]
async fn emoji_heavy_reports_fit_a_utf16_limit() {
    let (channel, log) = FakeChannel::new("utf16", 400);
    let notifier = Notifier::new(vec![boxed(channel.counting_utf16())], RetryPolicy::immediate(1));
    let report = report(40);
    let text = report.render_text();
    assert!(text.chars().count() < text.encode_utf16().count());

    notifier.send(&report).await.unwrap();

    let sent = log.sent();
    assert!(sent.len() > 1);
    assert!(sent.iter().all(|m| m.encode_utf16().count() <= 400));
    assert_eq!(sent.join("\n"), text);
}

#[tokio::test]
async fn one_failing_channel_does_not_block_another() {
    let (bad, _) = FakeChannel::new("bad", 4096);
    let bad = bad.failing(u32::MAX, SendError::Transport("down".into()));
    let (good, good_log) = FakeChannel::new("good", 4096);
    let notifier = Notifier::new(vec![boxed(bad), boxed(good)], RetryPolicy::immediate(2));

    let err = notifier.send(&report(1)).await.unwrap_err();

    assert_eq!(err.channel, "bad");
    assert_eq!(good_log.sent().len(), 1);
}

#[tokio::test]
async fn chart_is_attached_where_supported() {
    let (with, with_log) = FakeChannel::new("with", 4096);
    let (without, without_log) = FakeChannel::new("without", 4096);
    let notifier = Notifier::new(
        vec![boxed(with.with_attachments()), boxed(without)],
        RetryPolicy::immediate(1),
    )
    .with_renderer(Box::new(CsvChartRenderer));

    let ack = notifier.send(&report(1)).await.unwrap();

    assert_eq!(ack.attachments, 1);
    let files = with_log.attachments.lock().unwrap().clone();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].mime_type, "text/csv");
    assert!(without_log.attachments.lock().unwrap().is_empty());
}
