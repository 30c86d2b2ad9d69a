use std::time::Duration;

use crony_core::ExecutionRecord;
use handlebars::Handlebars;
use serde_json::json;

use crate::error::{NotifyError, Result};
use crate::truncate::truncate_output;

const BODY_TEMPLATE_NAME: &str = "mail-body";

// Handlebars escapes every `{{…}}` substitution, so raw container output is
// safe to embed.
const BODY_TEMPLATE: &str = r#"
<p>
    📦 Container: <b>{{workload}}</b>,
    Execution: return code <b>{{return_code}}</b> in ⏱️ <b>{{duration}}</b>
</p>
{{#if output_available}}
📝 stdOut: <pre>{{stdout}}</pre>
📝 stdErr: <pre style="color: #a13d3d">{{stderr}}</pre>
{{else}}
<p><i>Output of this execution could not be retrieved.</i></p>
{{/if}}
"#;

/// Subject and HTML body of an outcome mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
}

pub struct MessageRenderer {
    handlebars: Handlebars<'static>,
    max_output_chars: usize,
}

impl MessageRenderer {
    pub fn new(max_output_chars: usize) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars
            .register_template_string(BODY_TEMPLATE_NAME, BODY_TEMPLATE)
            .map_err(|e| NotifyError::Render(e.to_string()))?;
        Ok(Self {
            handlebars,
            max_output_chars,
        })
    }

    pub fn render(&self, record: &ExecutionRecord) -> Result<RenderedMessage> {
        let duration = short_duration(record.duration());
        let (stdout, stderr) = match &record.output {
            Some(out) => (
                self.prepare_output(&out.stdout),
                self.prepare_output(&out.stderr),
            ),
            None => (String::new(), String::new()),
        };

        let html_body = self
            .handlebars
            .render(
                BODY_TEMPLATE_NAME,
                &json!({
                    "workload": record.workload,
                    "return_code": record.return_code,
                    "duration": duration,
                    "output_available": record.output.is_some(),
                    "stdout": stdout,
                    "stderr": stderr,
                }),
            )
            .map_err(|e| NotifyError::Render(e.to_string()))?;

        Ok(RenderedMessage {
            subject: subject(&record.workload, record.return_code, &duration),
            html_body,
        })
    }

    /// Strip terminal colour codes and bound the length.
    fn prepare_output(&self, raw: &str) -> String {
        let clean = strip_ansi_escapes::strip(raw.as_bytes());
        truncate_output(&String::from_utf8_lossy(&clean), self.max_output_chars)
    }
}

pub fn subject(workload: &str, return_code: i64, duration: &str) -> String {
    if return_code == 0 {
        format!("[SUCCESS] ✔️ '{workload}' finished in {duration}")
    } else {
        format!("[FAIL] ❌ '{workload}' failed in {duration}")
    }
}

/// Human-readable duration truncated to whole seconds, e.g.
/// `1 hour 2 minutes 3 seconds`.
pub fn short_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0 seconds".to_string();
    }

    let mut parts = Vec::new();
    for (unit, size) in [("day", 86_400), ("hour", 3_600), ("minute", 60), ("second", 1)] {
        let n = secs / size;
        secs %= size;
        if n > 0 {
            let plural = if n == 1 { "" } else { "s" };
            parts.push(format!("{n} {unit}{plural}"));
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crony_core::CapturedOutput;

    fn record(code: i64, secs: i64, output: Option<CapturedOutput>) -> ExecutionRecord {
        let started_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        ExecutionRecord {
            workload: "backup".into(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(secs),
            return_code: code,
            output,
        }
    }

    #[test]
    fn durations_are_human_readable() {
        assert_eq!(short_duration(Duration::from_millis(900)), "0 seconds");
        assert_eq!(short_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(short_duration(Duration::from_secs(65)), "1 minute 5 seconds");
        assert_eq!(
            short_duration(Duration::from_secs(90_061)),
            "1 day 1 hour 1 minute 1 second"
        );
        assert_eq!(short_duration(Duration::from_secs(7_200)), "2 hours");
    }

    #[test]
    fn subject_distinguishes_outcome() {
        let ok = MessageRenderer::new(100).unwrap().render(&record(0, 3, None)).unwrap();
        assert_eq!(ok.subject, "[SUCCESS] ✔️ 'backup' finished in 3 seconds");

        let failed = MessageRenderer::new(100).unwrap().render(&record(7, 61, None)).unwrap();
        assert_eq!(failed.subject, "[FAIL] ❌ 'backup' failed in 1 minute 1 second");
    }

    #[test]
    fn body_escapes_and_cleans_output() {
        let output = CapturedOutput {
            stdout: "\u{1b}[32mdone\u{1b}[0m <ok>".into(),
            stderr: "warning & more".into(),
        };
        let msg = MessageRenderer::new(1_000)
            .unwrap()
            .render(&record(1, 2, Some(output)))
            .unwrap();

        assert!(msg.html_body.contains("<b>1</b>"));
        assert!(msg.html_body.contains("done &lt;ok&gt;"));
        assert!(msg.html_body.contains("warning &amp; more"));
        assert!(!msg.html_body.contains('\u{1b}'));
    }

    #[test]
    fn body_mentions_missing_output() {
        let msg = MessageRenderer::new(100).unwrap().render(&record(0, 1, None)).unwrap();
        assert!(msg.html_body.contains("could not be retrieved"));
        assert!(!msg.html_body.contains("stdOut"));
    }

    #[test]
    fn long_output_is_truncated() {
        let output = CapturedOutput {
            stdout: "x".repeat(5_000),
            stderr: String::new(),
        };
        let msg = MessageRenderer::new(100)
            .unwrap()
            .render(&record(0, 1, Some(output)))
            .unwrap();
        assert!(msg.html_body.contains("characters omitted"));
        assert!(!msg.html_body.contains(&"x".repeat(200)));
    }
}
