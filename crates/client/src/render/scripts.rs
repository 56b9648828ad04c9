//! Page scripts evaluated by the headless renderer.

use std::time::Duration;

/// Resolves once no DOM mutation has happened for `debounce`, or after
/// `ceiling` at the latest. Every mutation restarts the debounce timer.
pub fn settle_script(debounce: Duration, ceiling: Duration) -> String {
    format!(
        r#"new Promise((resolve) => {{
    const debounceMs = {debounce};
    const ceilingMs = {ceiling};
    let quiet;
    let cap;
    let observer;
    const done = (settled) => {{
        clearTimeout(quiet);
        clearTimeout(cap);
        if (observer) observer.disconnect();
        resolve(settled);
    }};
    const root = document.documentElement || document;
    observer = new MutationObserver(() => {{
        clearTimeout(quiet);
        quiet = setTimeout(() => done(true), debounceMs);
    }});
    observer.observe(root, {{ childList: true, subtree: true, attributes: true, characterData: true }});
    quiet = setTimeout(() => done(true), debounceMs);
    cap = setTimeout(() => done(false), ceilingMs);
}})"#,
        debounce = debounce.as_millis(),
        ceiling = ceiling.as_millis(),
    )
}

/// Scrolls to the bottom in viewport-sized steps to trigger lazy loading,
/// stopping after `limit`. Resolves to the number of steps taken.
pub fn scroll_script(limit: Duration) -> String {
    format!(
        r#"new Promise((resolve) => {{
    const limitMs = {limit};
    const started = Date.now();
    let steps = 0;
    const step = () => {{
        const height = document.body ? document.body.scrollHeight : 0;
        window.scrollBy(0, window.innerHeight);
        steps += 1;
        const atBottom = window.scrollY + window.innerHeight >= height;
        if (atBottom || Date.now() - started >= limitMs) {{
            window.scrollTo(0, 0);
            resolve(steps);
        }} else {{
            setTimeout(step, 150);
        }}
    }};
    step();
}})"#,
        limit = limit.as_millis(),
    )
}
