//! JavaScript evaluated in page context
//!
//! Arguments are embedded as JSON literals so selectors and labels never need
//! manual escaping.

use crate::driver::Locator;

/// Attribute used to hand a JS-resolved element over to CDP `DOM.querySelector`
pub const TARGET_ATTRIBUTE: &str = "data-smoke-target";

fn json(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Expression evaluating to the array of elements matching `locator`.
///
/// Text matching prefers an exact normalized match on the element text or its
/// `aria-label` and falls back to substring containment.
pub fn find_all(locator: &Locator) -> String {
    let text = match locator.text() {
        Some(text) => json(text),
        None => "null".to_string(),
    };
    format!(
        r#"(() => {{
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const all = Array.from(document.querySelectorAll({css}));
  const text = {text};
  if (text === null) return all;
  const label = (el) => norm(el.innerText || el.textContent);
  const exact = all.filter((el) => label(el) === text || norm(el.getAttribute('aria-label')) === text);
  if (exact.length) return exact;
  return all.filter((el) => label(el).includes(text));
}})()"#,
        css = json(locator.css_selector()),
        text = text,
    )
}

const VISIBLE_FN: &str = r#"(el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

pub fn is_visible(locator: &Locator) -> String {
    format!("{}.some({})", find_all(locator), VISIBLE_FN)
}

pub fn count(locator: &Locator) -> String {
    format!("{}.length", find_all(locator))
}

/// Mark the first visible match (or first match) with [`TARGET_ATTRIBUTE`] = `marker`.
/// Evaluates to `false` when nothing matches.
pub fn tag_target(locator: &Locator, marker: &str) -> String {
    format!(
        r#"(() => {{
  document.querySelectorAll('[{attr}]').forEach((el) => el.removeAttribute('{attr}'));
  const matches = {find};
  const visible = {visible};
  const el = matches.find(visible) || matches[0];
  if (!el) return false;
  el.setAttribute('{attr}', {marker});
  return true;
}})()"#,
        attr = TARGET_ATTRIBUTE,
        find = find_all(locator),
        visible = VISIBLE_FN,
        marker = json(marker),
    )
}

/// CSS selector for the element tagged by [`tag_target`]
pub fn target_selector(marker: &str) -> String {
    format!(r#"[{}="{}"]"#, TARGET_ATTRIBUTE, marker)
}

/// Set a form control's value through the native setter and fire `input`/`change`,
/// so framework-controlled inputs observe the change. Evaluates to `false` when
/// nothing matches or a `<select>` has no such option.
pub fn set_value(locator: &Locator, value: &str) -> String {
    format!(
        r#"(() => {{
  const el = {find}[0];
  if (!el) return false;
  const value = {value};
  if (el instanceof HTMLSelectElement && !Array.from(el.options).some((o) => o.value === value)) return false;
  const proto = Object.getPrototypeOf(el);
  const setter = Object.getOwnPropertyDescriptor(proto, 'value');
  if (setter && setter.set) setter.set.call(el, value); else el.value = value;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        find = find_all(locator),
        value = json(value),
    )
}

pub fn input_value(locator: &Locator) -> String {
    format!(
        "(() => {{ const el = {}[0]; return el ? String(el.value ?? '') : null; }})()",
        find_all(locator)
    )
}

pub fn attribute(locator: &Locator, name: &str) -> String {
    format!(
        "(() => {{ const el = {}[0]; return el ? el.getAttribute({}) : null; }})()",
        find_all(locator),
        json(name)
    )
}

/// Resolves to `true` when the session endpoint answers 2xx with the page's cookies
pub fn session_probe(path: &str) -> String {
    format!(
        "fetch({}, {{ credentials: 'include' }}).then((r) => r.ok).catch(() => false)",
        json(path)
    )
}

pub fn ready_state() -> String {
    "document.readyState".to_string()
}

pub fn storage_set(key: &str, value: &str) -> String {
    format!(
        "(() => {{ window.localStorage.setItem({}, {}); return true; }})()",
        json(key),
        json(value)
    )
}

pub fn storage_get(key: &str) -> String {
    format!("window.localStorage.getItem({})", json(key))
}

/// Ask the application's internal event bus to switch apps, falling back to a
/// DOM event when the bus is not exposed.
pub fn dispatch_app_switch(app: &str) -> String {
    format!(
        r#"(() => {{
  const app = {app};
  const bus = window.__appEventBus;
  if (bus && typeof bus.emit === 'function') {{
    bus.emit('app:switch', {{ app }});
    return 'bus';
  }}
  window.dispatchEvent(new CustomEvent('app:switch', {{ detail: {{ app }} }}));
  return 'event';
}})()"#,
        app = json(app),
    )
}

/// Auto-accept `confirm()` prompts such as the delete confirmation
pub fn accept_dialogs() -> String {
    "(() => { window.confirm = () => true; return true; })()".to_string()
}
