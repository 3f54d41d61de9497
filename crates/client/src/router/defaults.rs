//! The standard route table of the application shell.

use offgrid_core::AppConfig;
use reqwest::Method;

use super::{Matcher, RouteRule};
use crate::fetch::Destination;
use crate::strategy::{CacheFirst, NetworkFirst, NetworkOnly, StaleWhileRevalidate};

pub const TASK_QUEUE: &str = "task-queue";
pub const API_READ_NAMESPACE: &str = "api-read";
pub const IMAGES_NAMESPACE: &str = "images";
pub const NAVIGATION_NAMESPACE: &str = "navigation-shell";
pub const STATIC_NAMESPACE: &str = "static-resources";

/// Route table in match order.
pub fn default_rules(config: &AppConfig) -> Vec<RouteRule> {
    let api = || Matcher::All(vec![Matcher::SameOrigin, Matcher::PathPrefix(config.api_prefix.clone())]);
    let network_timeout = config.network_timeout();

    vec![
        RouteRule::new("api-write", api(), NetworkOnly, "api-write")
            .methods([Method::POST, Method::PATCH, Method::DELETE])
            .queue(TASK_QUEUE),
        RouteRule::new("api-read", api(), NetworkFirst::new(network_timeout), API_READ_NAMESPACE),
        RouteRule::new("images", Matcher::Destination(Destination::Image), CacheFirst, IMAGES_NAMESPACE),
        RouteRule::new(
            "navigation",
            Matcher::Destination(Destination::Document),
            NetworkFirst::new(network_timeout),
            NAVIGATION_NAMESPACE,
        ),
        RouteRule::new(
            "static",
            Matcher::All(vec![
                Matcher::SameOrigin,
                Matcher::Destinations(vec![
                    Destination::Script,
                    Destination::Style,
                    Destination::Worker,
                    Destination::Font,
                    Destination::Manifest,
                ]),
            ]),
            StaleWhileRevalidate,
            STATIC_NAMESPACE,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Request;

    fn owner(request: &Request) -> Option<String> {
        let rules = default_rules(&AppConfig::default());
        rules.into_iter().find(|r| r.matches(request)).map(|r| r.name)
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<String> = default_rules(&AppConfig::default()).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["api-write", "api-read", "images", "navigation", "static"]);
    }

    #[test]
    fn test_requests_land_on_expected_rules() {
        let post = Request::post("http://localhost:3000/task/create").unwrap();
        let list = Request::get("http://localhost:3000/task").unwrap();
        let logo = Request::get("http://localhost:3000/img/logo.png").unwrap().with_destination(Destination::Image);
        let page = Request::get("http://localhost:3000/").unwrap().with_destination(Destination::Document);
        let js = Request::get("http://localhost:3000/assets/app.js").unwrap().with_destination(Destination::Script);
        let cdn_js = js.clone().cross_origin();
        let put = Request::parse(Method::PUT, "http://localhost:3000/task/1", None).unwrap();

        assert_eq!(owner(&post).as_deref(), Some("api-write"));
        assert_eq!(owner(&list).as_deref(), Some("api-read"));
        assert_eq!(owner(&logo).as_deref(), Some("images"));
        assert_eq!(owner(&page).as_deref(), Some("navigation"));
        assert_eq!(owner(&js).as_deref(), Some("static"));
        assert_eq!(owner(&cdn_js), None);
        assert_eq!(owner(&put), None);
    }

    #[test]
    fn test_only_writes_are_queued() {
        let rules = default_rules(&AppConfig::default());
        let queued: Vec<&str> = rules.iter().filter(|r| r.queue.is_some()).map(|r| r.name.as_str()).collect();
        assert_eq!(queued, vec!["api-write"]);
    }
}
