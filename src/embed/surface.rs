//! Host page markup for the embedded portfolio frame.

/// Sandbox tokens granted to the portfolio: same-origin access, scripts,
/// pop-ups and forms. No top-level navigation, no plugins.
pub const FRAME_SANDBOX: &str = "allow-same-origin allow-scripts allow-popups allow-forms";

/// DOM id of the portfolio frame in the host page
pub const FRAME_ID: &str = "portfolio-frame";

/// Window property the frame's load/error handlers record into
pub const FRAME_STATE_VAR: &str = "__portfolioFrameState";

/// Renders the page that hosts the portfolio frame.
///
/// The frame's `onload`/`onerror` handlers set [`FRAME_STATE_VAR`] on the host
/// window to `"loaded"` or `"error"`.
pub fn host_page(portfolio_url: &str, title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>html,body{{margin:0;height:100%}}iframe{{border:0;width:100%;height:100%}}</style>
</head>
<body>
<iframe id="{id}" src="{src}" title="Portfolio" sandbox="{sandbox}" onload="window.{var}='loaded'" onerror="window.{var}='error'"></iframe>
</body>
</html>
"#,
        title = escape_html(title),
        id = FRAME_ID,
        src = escape_html(portfolio_url),
        sandbox = FRAME_SANDBOX,
        var = FRAME_STATE_VAR,
    )
}

/// Script returning the recorded frame state, or null while still pending
pub fn frame_state_script() -> String {
    format!("return window.{FRAME_STATE_VAR} || null;")
}

/// Script classifying access to the frame's document
pub fn probe_script() -> String {
    format!(
        r#"const frame = document.getElementById('{FRAME_ID}');
if (!frame) {{ return 'absent'; }}
try {{
  const doc = frame.contentDocument || (frame.contentWindow && frame.contentWindow.document);
  return doc ? 'accessible' : 'absent';
}} catch (e) {{
  return 'blocked';
}}"#
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
