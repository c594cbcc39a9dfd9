//! Landing and editor pages.

use std::fmt::Write as _;

use codeshare_core::{Language, SessionId};

const STYLE: &str = r"
    body {
        margin: 0;
        background: #111827;
        color: #f9fafb;
        font-family: system-ui, sans-serif;
    }
    header {
        display: flex;
        justify-content: space-between;
        align-items: center;
        padding: 12px 20px;
        background: #1f2937;
        border-bottom: 1px solid #374151;
    }
    a.brand { color: #60a5fa; font-weight: 600; text-decoration: none; }
    select, button {
        background: #374151;
        color: #fff;
        border: none;
        border-radius: 6px;
        padding: 8px 12px;
    }
    button.primary { background: #2563eb; }
    .status { color: #9ca3af; font-size: 14px; margin-left: 12px; }
    .status.saved { color: #4ade80; }
    .status.error { color: #f87171; }
";

/// Landing page.
#[must_use]
pub fn landing() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>EditorShare</title>
    <style>{STYLE}
        main {{ text-align: center; padding-top: 20vh; }}
        h1 {{ font-size: 48px; margin-bottom: 16px; }}
        p {{ color: #d1d5db; margin-bottom: 40px; }}
        a.start {{
            background: #2563eb;
            color: #fff;
            padding: 16px 32px;
            border-radius: 8px;
            text-decoration: none;
            font-size: 18px;
        }}
    </style>
</head>
<body>
    <header><a class="brand" href="/">EditorShare</a></header>
    <main>
        <h1>Code Together, Instantly</h1>
        <p>Real-time collaborative code editor. No signup required.</p>
        <a class="start" href="/new">Start Coding Now</a>
    </main>
</body>
</html>
"#
    )
}

/// Editor page for one session.
#[must_use]
pub fn editor(id: &SessionId) -> String {
    let mut options = String::new();
    for lang in Language::ALL {
        let _ = write!(
            options,
            r#"<option value="{}">{}</option>"#,
            lang.as_str(),
            lang.label()
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>EditorShare - {id}</title>
    <style>{STYLE}
        body {{ height: 100vh; display: flex; flex-direction: column; }}
        textarea {{
            flex: 1;
            margin: 0;
            padding: 16px;
            border: none;
            resize: none;
            outline: none;
            background: #1e1e1e;
            color: #d4d4d4;
            font: 14px Menlo, Monaco, "Courier New", monospace;
        }}
    </style>
</head>
<body>
    <header>
        <div>
            <a class="brand" href="/">EditorShare</a>
            <select id="language">{options}</select>
        </div>
        <div>
            <button class="primary" id="share">Share</button>
            <span class="status" id="status"></span>
        </div>
    </header>
    <textarea id="editor" spellcheck="false"></textarea>

    <script>
        const sessionId = "{id}";
        const editor = document.getElementById('editor');
        const language = document.getElementById('language');
        const status = document.getElementById('status');
        let ws;

        function send(msg) {{
            if (ws && ws.readyState === WebSocket.OPEN) {{
                ws.send(JSON.stringify(msg));
            }}
        }}

        function showStatus(state, message) {{
            status.textContent = message;
            status.className = 'status'
                + (state === 'saved' ? ' saved' : '')
                + (state === 'error_saving' || state === 'error_creating' ? ' error' : '');
        }}

        function connect() {{
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${{protocol}}//${{window.location.host}}/ws`);

            ws.onopen = () => send({{ type: 'join', session_id: sessionId }});
            ws.onclose = () => setTimeout(connect, 2000);
            ws.onerror = (err) => console.error('WebSocket error:', err);

            ws.onmessage = (event) => {{
                const msg = JSON.parse(event.data);
                switch (msg.type) {{
                    case 'joined':
                        editor.value = msg.content;
                        language.value = msg.language;
                        break;
                    case 'content':
                        if (msg.content !== editor.value) editor.value = msg.content;
                        break;
                    case 'language':
                        if (msg.language !== language.value) language.value = msg.language;
                        break;
                    case 'status':
                        showStatus(msg.state, msg.message);
                        break;
                    case 'error':
                        console.error(msg.message);
                        break;
                }}
            }};
        }}

        editor.addEventListener('input', () => send({{ type: 'edit', content: editor.value }}));
        language.addEventListener('change', () =>
            send({{ type: 'set_language', language: language.value }}));
        document.getElementById('share').addEventListener('click', () => {{
            if (!navigator.clipboard) {{
                console.error('Clipboard unavailable');
                return;
            }}
            navigator.clipboard.writeText(window.location.href)
                .then(() => {{
                    showStatus('link_copied', 'Link copied!');
                    setTimeout(() => {{
                        if (status.textContent === 'Link copied!') showStatus('idle', '');
                    }}, 2000);
                    send({{ type: 'link_copied' }});
                }})
                .catch((err) => console.error('Copy failed:', err));
        }});

        connect();
    </script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_embeds_session_and_languages() {
        let id = SessionId::parse("A1").unwrap();
        let html = editor(&id);
        assert!(html.contains(r#"const sessionId = "A1";"#));
        for lang in Language::ALL {
            assert!(html.contains(&format!(r#"<option value="{}">"#, lang.as_str())));
        }
    }

    #[test]
    fn test_share_copies_in_click_handler() {
        let html = editor(&SessionId::parse("A1").unwrap());
        assert!(html.contains("navigator.clipboard.writeText(window.location.href)"));
        assert!(html.contains("type: 'link_copied'"));
        assert!(!html.contains("copy_to_clipboard"));
    }

    #[test]
    fn test_landing_starts_new_session() {
        assert!(landing().contains(r#"href="/new""#));
    }
}
