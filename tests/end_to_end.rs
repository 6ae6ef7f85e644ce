use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use bullseye::{DomPort, GradingRuntime, RuntimeEvent};
use bullseye_dom_port::FixtureDom;

/// A small page: a nav with three links, a sized hero heading, and an
/// image that is still missing its alt text.
fn sample_page() -> FixtureDom {
    let dom = FixtureDom::new();
    let nav = dom.insert(None, "nav");
    for name in ["Home", "About", "Contact"] {
        let a = dom.insert(Some(nav), "a");
        dom.set_html(a, name);
    }
    let hero = dom.insert(None, "h1");
    dom.set_style(hero, "font-size", "48px");
    dom.set_html(hero, "Welcome");
    dom.insert(None, "img");
    dom
}

const SUITES: &str = r#"[
    {
        "name": "Navigation",
        "code": "nav-unlock",
        "tests": [
            {
                "description": "the nav holds exactly three links",
                "definition": {"nodes": "nav", "children": "a", "get": "count", "equals": 3}
            },
            {
                "description": "every link has text",
                "definition": {"nodes": "nav a", "get": "innerHTML", "exists": true}
            }
        ]
    },
    {
        "name": "Hero",
        "code": "hero-unlock",
        "tests": [
            {
                "description": "the heading is at least 40px",
                "definition": {"nodes": "h1", "cssProperty": "font-size", "isGreaterThan": {"expected": 40, "orEqualTo": true}}
            },
            {
                "description": "the heading greets the visitor",
                "definition": {"nodes": "h1", "get": "innerHTML", "hasSubstring": "Welcome"}
            }
        ]
    },
    {
        "name": "Accessibility",
        "code": "a11y-unlock",
        "tests": [
            {
                "description": "the image has alt text",
                "definition": {"nodes": "img", "attribute": "alt", "exists": true}
            }
        ]
    }
]"#;

/// Suites complete in pipeline order, not registration order, so buffer
/// every `SuitePassed` event in `seen` and return once the requested
/// suite has been announced.
async fn wait_for_suite(
    rx: &mut tokio::sync::broadcast::Receiver<RuntimeEvent>,
    seen: &mut std::collections::HashMap<String, String>,
    name: &str,
) -> String {
    timeout(Duration::from_secs(30), async {
        loop {
            if let Some(code) = seen.get(name) {
                return code.clone();
            }
            if let Ok(RuntimeEvent::SuitePassed { suite, code }) =
                rx.recv().await.map_err(|_| ())
            {
                seen.insert(suite, code);
            }
        }
    })
    .await
    .expect("suite should pass before timeout")
}

#[tokio::test(start_paused = true)]
async fn grades_a_page_as_it_gets_fixed() {
    let dom = Arc::new(sample_page());
    let runtime = GradingRuntime::new(Arc::clone(&dom));
    let mut rx = runtime.subscribe();
    let mut seen = std::collections::HashMap::new();

    runtime.register_suites(SUITES).unwrap();
    runtime.turn_on().unwrap();

    // Navigation and Hero pass against the initial page.
    assert_eq!(
        wait_for_suite(&mut rx, &mut seen, "Navigation").await,
        "nav-unlock"
    );
    assert_eq!(
        wait_for_suite(&mut rx, &mut seen, "Hero").await,
        "hero-unlock"
    );
    assert!(!runtime.all_correct());

    // The student adds the missing alt text; the repeating test notices.
    let img = dom.query("img").await.unwrap()[0];
    dom.set_attr(img, "alt", "a friendly mascot");
    assert_eq!(
        wait_for_suite(&mut rx, &mut seen, "Accessibility").await,
        "a11y-unlock"
    );
    assert!(runtime.all_correct());

    let dump = runtime.debug_dump();
    assert_eq!(dump.len(), 3);
    assert!(dump.iter().all(|suite| suite.passed));

    runtime.turn_off();
    assert!(runtime.debug_dump().is_empty());
}

#[tokio::test(start_paused = true)]
async fn direct_assessor_use_without_a_runtime() {
    let dom = Arc::new(sample_page());
    let report = bullseye::Assessor::new(dom, "three nav links")
        .these_elements("nav")
        .deep_children("a")
        .get(bullseye::ValueSource::Count)
        .equals(vec![json!(3)])
        .run()
        .await;

    assert!(report.passed);
    assert_eq!(report.values, vec!["3"]);
    assert!(report.fatal.is_none());
}
