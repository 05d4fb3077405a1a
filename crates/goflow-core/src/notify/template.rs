use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmailMessage;

const NO_DESCRIPTION: &str = "No description provided.";

/// Everything the task emails interpolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMailContext {
    pub task_title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_name: String,
    pub assignee_email: String,
    pub project_name: String,
    /// Link back to the application.
    pub origin: String,
}

/// Email sent when a task is assigned.
pub fn assignment_email(ctx: &TaskMailContext) -> EmailMessage {
    let project = escape_html(&ctx.project_name);
    let body = format!(
        r#"<p style="margin:0 0 12px 0;font-size:16px;color:#111827;">Hi {name},</p>
<p style="margin:0 0 16px 0;font-size:14px;color:#4b5563;line-height:1.6;">
  You have been assigned a new task in <strong>{project}</strong>.
  Please review the details below and take the necessary action.
</p>
{card}
{button}
<p style="margin:24px 0 0 0;font-size:13px;color:#6b7280;">Best regards,<br/>The {project} Team</p>"#,
        name = escape_html(&ctx.assignee_name),
        project = project,
        card = task_card(ctx, "Task Summary", None),
        button = link_button(&ctx.origin, "View Task"),
    );

    EmailMessage {
        to: ctx.assignee_email.clone(),
        subject: format!("New Task Assignment in {}", ctx.project_name),
        html: layout(
            "New Task Assignment",
            &format!("New Task Assigned in {}", project),
            &body,
            "This is an automated message about your task assignment.",
        ),
    }
}

/// Email sent when a task is still open at its due date.
pub fn reminder_email(ctx: &TaskMailContext) -> EmailMessage {
    let project = escape_html(&ctx.project_name);
    let body = format!(
        r#"<p style="margin:0 0 12px 0;font-size:16px;color:#111827;">Hi {name},</p>
<p style="margin:0 0 16px 0;font-size:14px;color:#4b5563;line-height:1.6;">
  This is a friendly reminder that you still have a pending task in <strong>{project}</strong>.
  Please review the details below and update the status when you're done.
</p>
{card}
{button}
<p style="margin:24px 0 0 0;font-size:13px;color:#6b7280;">Thank you for keeping your tasks up to date.<br/>The {project} Team</p>"#,
        name = escape_html(&ctx.assignee_name),
        project = project,
        card = task_card(ctx, "Task Details", Some("Pending")),
        button = link_button(&ctx.origin, "View &amp; Update Task"),
    );

    EmailMessage {
        to: ctx.assignee_email.clone(),
        subject: format!("Reminder for {}", ctx.project_name),
        html: layout(
            "Task Reminder",
            &format!("Task Reminder - {}", project),
            &body,
            "This is an automated reminder about your pending task.",
        ),
    }
}

/// Format a due date as a calendar date.
pub fn format_due_date(due_date: Option<DateTime<Utc>>) -> String {
    match due_date {
        Some(date) => date.format("%B %-d, %Y").to_string(),
        None => "No due date".to_string(),
    }
}

/// Escape text for interpolation into HTML, including attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn task_card(ctx: &TaskMailContext, label: &str, status: Option<&str>) -> String {
    let description = ctx
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(NO_DESCRIPTION);
    let status = status
        .map(|s| {
            format!(
                r#"<p style="margin:8px 0 0 0;font-size:13px;color:#ef4444;">Status: <strong>{}</strong></p>"#,
                s
            )
        })
        .unwrap_or_default();

    format!(
        r#"<div style="margin:16px 0;padding:16px;border-radius:0.75rem;background-color:#f9fafb;border:1px solid #e5e7eb;">
  <p style="margin:0 0 8px 0;font-size:13px;font-weight:600;color:#6b7280;text-transform:uppercase;">{label}</p>
  <h2 style="margin:0 0 8px 0;font-size:18px;font-weight:600;color:#111827;">{title}</h2>
  <p style="margin:0 0 12px 0;font-size:14px;color:#4b5563;line-height:1.6;">{description}</p>
  <p style="margin:0;font-size:14px;color:#374151;"><strong>Due date:</strong> <span style="margin-left:4px;">{due}</span></p>
  {status}
</div>"#,
        label = label,
        title = escape_html(&ctx.task_title),
        description = escape_html(description),
        due = format_due_date(ctx.due_date),
        status = status,
    )
}

fn link_button(origin: &str, label: &str) -> String {
    let href = escape_html(origin);
    format!(
        r#"<div style="text-align:center;margin:24px 0 8px 0;">
  <a href="{href}" style="display:inline-block;padding:10px 20px;border-radius:9999px;background-color:#2563eb;color:#ffffff;text-decoration:none;font-size:14px;font-weight:600;">{label}</a>
</div>
<p style="margin:16px 0 0 0;font-size:12px;color:#9ca3af;text-align:center;">
  If the button doesn't work, copy and paste this link into your browser:<br/>
  <span style="word-break:break-all;color:#6b7280;">{href}</span>
</p>"#,
        href = href,
        label = label,
    )
}

fn layout(title: &str, heading: &str, body: &str, footer: &str) -> String {
    format!(
        r#"<html lang="en">
<head>
  <meta charset="UTF-8" />
  <title>{title}</title>
</head>
<body style="margin:0;padding:0;background-color:#f3f4f6;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="background-color:#f3f4f6;padding:24px 0;">
    <tr>
      <td align="center">
        <table width="600" cellspacing="0" cellpadding="0" style="background-color:#ffffff;border-radius:0.75rem;overflow:hidden;font-family:system-ui,-apple-system,'Segoe UI',sans-serif;">
          <tr>
            <td style="background-color:#0f172a;padding:20px 24px;color:#e5e7eb;">
              <h1 style="margin:0;font-size:20px;font-weight:600;">{heading}</h1>
            </td>
          </tr>
          <tr>
            <td style="padding:24px;">
{body}
            </td>
          </tr>
          <tr>
            <td style="padding:12px 24px;background-color:#f9fafb;text-align:center;font-size:11px;color:#9ca3af;">{footer}</td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#,
        title = title,
        heading = heading,
        body = body,
        footer = footer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context() -> TaskMailContext {
        TaskMailContext {
            task_title: "Write <release> notes".into(),
            description: None,
            due_date: Some(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()),
            assignee_name: "Ada Lovelace".into(),
            assignee_email: "ada@example.com".into(),
            project_name: "Apollo".into(),
            origin: "https://app.example.com/tasks?id=1&tab=2".into(),
        }
    }

    #[test]
    fn test_assignment_email() {
        let mail = assignment_email(&context());

        assert_eq!(mail.to, "ada@example.com");
        assert_eq!(mail.subject, "New Task Assignment in Apollo");
        assert!(mail.html.contains("Hi Ada Lovelace,"));
        assert!(mail.html.contains("Write &lt;release&gt; notes"));
        assert!(mail.html.contains(NO_DESCRIPTION));
        assert!(mail.html.contains("March 5, 2026"));
        assert!(mail.html.contains("id=1&amp;tab=2"));
        assert!(!mail.html.contains("Status:"));
    }

    #[test]
    fn test_reminder_email() {
        let mut ctx = context();
        ctx.description = Some("Ship it".into());
        let mail = reminder_email(&ctx);

        assert_eq!(mail.subject, "Reminder for Apollo");
        assert!(mail.html.contains("Ship it"));
        assert!(!mail.html.contains(NO_DESCRIPTION));
        assert!(mail.html.contains("Status: <strong>Pending</strong>"));
    }

    #[test]
    fn test_blank_description_falls_back() {
        let mut ctx = context();
        ctx.description = Some("   ".into());
        assert!(assignment_email(&ctx).html.contains(NO_DESCRIPTION));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
        assert_eq!(format_due_date(None), "No due date");
    }
}
