use core::time::Duration;
use std::{ffi::OsStr, sync::Arc};

use headless_chrome::{Browser, LaunchOptions, Tab, protocol::cdp::Network::Cookie};
use serde_json::Value;

use super::Session;

/// Time the survival page gets to set its cookies after navigation.
const SETTLE: Duration = Duration::from_millis(1500);

pub fn puppeteer(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
        headless,
        ..LaunchOptions::default()
    })
}

#[allow(clippy::significant_drop_tightening)]
pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Blocking: opens `url` in Chrome and returns the cookies the page set,
/// together with the browser's user agent.
pub fn acquire_session(url: &str, headless: bool) -> anyhow::Result<Session> {
    let browser = puppeteer(headless)?;
    let tab = first_tab(&browser)?;

    tracing::info!(target: "session", "opening \x1b[1;36m{url}\x1b[0m ...");
    tab.navigate_to(url)?.wait_until_navigated()?;
    std::thread::sleep(SETTLE);

    let cookies = tab.get_cookies()?;
    let user_agent = match tab.evaluate("navigator.userAgent", false)?.value {
        Some(Value::String(ua)) => Some(ua),
        _ => None,
    };
    tracing::info!(target: "session", "captured {} cookies", cookies.len());

    Ok(Session {
        cookie: cookie_header(&cookies),
        user_agent,
    })
}
