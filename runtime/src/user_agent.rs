//! Random browser User-Agent strings, weighted by browser share.

use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
    InternetExplorer,
    Opera,
    OperaMini,
}

impl Browser {
    /// Chrome 70%, Firefox 15%, IE 6%, Opera 5%, Opera Mini 4%.
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Browser {
        match rng.gen_range(1..=100) {
            1..=70 => Browser::Chrome,
            71..=85 => Browser::Firefox,
            86..=91 => Browser::InternetExplorer,
            92..=96 => Browser::Opera,
            _ => Browser::OperaMini,
        }
    }
}

const WINDOWS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Windows NT 10.0; WOW64",
    "Windows NT 6.3; Win64; x64",
    "Windows NT 6.1; Win64; x64",
    "Windows NT 6.1",
];

const DESKTOP: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Windows NT 6.1; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

fn choose<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

pub fn user_agent<R: Rng + ?Sized>(browser: Browser, rng: &mut R) -> String {
    match browser {
        Browser::Chrome => {
            let os = choose(rng, DESKTOP);
            let major = rng.gen_range(90..=120);
            let build = rng.gen_range(4000..=6100);
            let patch = rng.gen_range(0..=200);
            format!(
                "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/537.36",
                os, major, build, patch
            )
        }
        Browser::Firefox => {
            let os = choose(rng, DESKTOP);
            let version = rng.gen_range(90..=120);
            format!("Mozilla/5.0 ({}; rv:{}.0) Gecko/20100101 Firefox/{}.0", os, version, version)
        }
        Browser::InternetExplorer => {
            let os = choose(rng, WINDOWS);
            format!("Mozilla/5.0 ({}; Trident/7.0; rv:11.0) like Gecko", os)
        }
        Browser::Opera => {
            let os = choose(rng, WINDOWS);
            let minor = rng.gen_range(0..=18);
            format!("Opera/9.80 ({}; U) Presto/2.12.388 Version/12.{}", os, minor)
        }
        Browser::OperaMini => {
            let major = rng.gen_range(4..=8);
            let build = rng.gen_range(20000..=40000);
            format!(
                "Opera/9.80 (J2ME/MIDP; Opera Mini/{}.0.{}/{}; U; en) Presto/2.8.119 Version/11.10",
                major, build, build / 10
            )
        }
    }
}

/// A User-Agent for a browser picked by share.
pub fn random_user_agent<R: Rng + ?Sized>(rng: &mut R) -> String {
    let browser = Browser::pick(rng);
    user_agent(browser, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn every_browser_renders() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(user_agent(Browser::Chrome, &mut rng).contains("Chrome/"));
        assert!(user_agent(Browser::Firefox, &mut rng).contains("Firefox/"));
        assert!(user_agent(Browser::InternetExplorer, &mut rng).contains("Trident/7.0"));
        assert!(user_agent(Browser::Opera, &mut rng).starts_with("Opera/9.80 (Windows"));
        assert!(user_agent(Browser::OperaMini, &mut rng).contains("Opera Mini/"));
    }

    #[test]
    fn chrome_dominates_the_draw() {
        let mut rng = StdRng::seed_from_u64(11);
        let chrome = (0..1000)
            .filter(|_| Browser::pick(&mut rng) == Browser::Chrome)
            .count();
        assert!((600..800).contains(&chrome), "{}", chrome);
    }
}
