mod browser;
mod fast;

pub use browser::{BrowserClient, BrowserSource, HttpBrowserClient, NoopBrowserClient};
pub use fast::FastSource;
