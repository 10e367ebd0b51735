use std::{collections::HashSet, sync::Arc, time::Duration};

use fleet::{
    configuration::PipelineSettings,
    domain::{DiscoveryMode, SearchResult, UrlValidity},
    services::{BatchOrchestrator, BatchRequest, BatchState, Collaborators, PipelineError},
    testing::{FakeLauncher, FakeProbe, FakeSearch, MemorySink, ScriptedModel},
};

const RELEVANCE: &str = "Answer only yes or no.";
const EXTRACTION: &str = "Extract the details of the company behind this web page.";
const VALIDITY: &str = "isCompanyUrlValid";

fn settings() -> PipelineSettings {
    PipelineSettings {
        chunk_pause_ms: 0,
        retry_pass_delay_ms: 0,
        min_delay_ms: 0,
        max_delay_ms: 0,
        requests_per_minute: 0,
        ..PipelineSettings::default()
    }
}

struct Harness {
    search: FakeSearch,
    model: ScriptedModel,
    probe: FakeProbe,
    sink: MemorySink,
    launcher: FakeLauncher,
    pool_width: usize,
}

impl Harness {
    fn new(search: FakeSearch, model: ScriptedModel) -> Self {
        Harness {
            search,
            model,
            probe: FakeProbe::new(),
            sink: MemorySink::new(),
            launcher: FakeLauncher::new(),
            pool_width: 2,
        }
    }

    fn orchestrator(&self, settings: PipelineSettings) -> BatchOrchestrator {
        BatchOrchestrator::new(
            settings,
            self.pool_width,
            Collaborators {
                search: Arc::new(self.search.clone()),
                llm: Arc::new(self.model.clone()),
                probe: Arc::new(self.probe.clone()),
                sink: Arc::new(self.sink.clone()),
                launcher: Arc::new(self.launcher.clone()),
            },
        )
    }
}

fn request(cities: &[&str], mode: DiscoveryMode) -> BatchRequest {
    BatchRequest {
        request_id: "test1234".to_string(),
        cities: cities.iter().map(|c| c.to_string()).collect(),
        mode,
        destination: "Upfitters".to_string(),
    }
}

fn springfield() -> Harness {
    let search = FakeSearch::new().results(
        "Upfitters in Springfield, IL",
        0,
        vec![
            SearchResult::new(
                "Acme Upfit",
                "https://acme.example",
                "Police vehicle upfitting in Springfield",
            ),
            SearchResult::new(
                "Blue Line Fleet",
                "https://blueline.example",
                "Fleet and emergency installs",
            ),
            SearchResult::new(
                "Upfitter Jobs",
                "https://jobs.example",
                "Apply for upfitter jobs near you",
            ),
        ],
    );

    let model = ScriptedModel::new()
        .reply_when_all(&[RELEVANCE, "acme.example"], "yes")
        .reply_when_all(&[RELEVANCE, "blueline.example"], "Yes.")
        .reply_when_all(&[RELEVANCE, "jobs.example"], "no")
        .reply_when_all(
            &[EXTRACTION, "acme.example"],
            r#"{"name": "Acme Upfit", "phone": "217-555-0100", "ownerName": "NA", "location": "Springfield, IL", "description": "Police upfits"}"#,
        )
        .reply_when_all(
            &[EXTRACTION, "blueline.example"],
            "```json\n{\"name\": \"Blue Line Fleet\", \"phone\": \"217-555-0111\", \"description\": \"Fleet installs\",}\n```",
        )
        .reply_when_all(&[VALIDITY, "acme.example"], r#"{"isCompanyUrlValid": "valid"}"#)
        .reply_when_all(&[VALIDITY, "blueline.example"], r#"{"isCompanyUrlValid": "invalid"}"#);

    let mut harness = Harness::new(search, model);
    harness.probe = FakeProbe::new()
        .reachable("https://acme.example")
        .reachable("https://blueline.example");
    harness
}

#[tokio::test]
async fn relevant_results_end_up_in_the_sink() {
    let harness = springfield();

    let report = harness
        .orchestrator(settings())
        .run(request(&["Springfield, IL"], DiscoveryMode::Search))
        .await
        .unwrap();

    assert_eq!(report.request_id, "test1234");
    assert_eq!(report.total_cities, 1);
    assert_eq!(report.results_found, 2);

    let writes = harness.sink.writes();
    assert_eq!(writes.len(), 1);
    let (destination, rows) = &writes[0];
    assert_eq!(destination, "Upfitters");
    assert_eq!(rows.len(), 2);

    let acme = rows.iter().find(|r| r.name == "Acme Upfit").unwrap();
    assert_eq!(acme.company_url.as_deref(), Some("https://acme.example"));
    assert_eq!(acme.phone.as_deref(), Some("217-555-0100"));
    assert_eq!(acme.is_company_url_valid, UrlValidity::Valid);

    let blue_line = rows.iter().find(|r| r.name == "Blue Line Fleet").unwrap();
    assert_eq!(blue_line.company_url.as_deref(), Some("https://blueline.example"));
    assert_eq!(blue_line.is_company_url_valid, UrlValidity::Invalid);

    assert!(!harness
        .launcher
        .loads()
        .iter()
        .any(|url| url.contains("jobs.example")));
    assert_eq!(harness.launcher.open_contexts(), 0);
}

#[tokio::test]
async fn cancelled_batches_close_the_browser_pool() {
    let mut harness = springfield();
    harness.launcher = FakeLauncher::new().with_latency(Duration::from_secs(5));

    let orchestrator = harness.orchestrator(settings());
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        orchestrator.run(request(&["Springfield, IL"], DiscoveryMode::Search)),
    )
    .await;
    assert!(cancelled.is_err());
    assert_eq!(harness.launcher.launched(), 2);

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.launcher.open_contexts(), 0);
    assert!(harness.sink.writes().is_empty());
}

#[tokio::test]
async fn city_without_results_clears_the_destination() {
    let harness = Harness::new(FakeSearch::new(), ScriptedModel::new());

    let report = harness
        .orchestrator(settings())
        .run(request(&["Nowhere City"], DiscoveryMode::Search))
        .await
        .unwrap();

    assert_eq!(report.results_found, 0);
    assert!(report.data.is_empty());
    assert_eq!(
        harness.sink.writes(),
        vec![("Upfitters".to_string(), vec![])]
    );
    assert_eq!(harness.model.calls(), 0);
    assert_eq!(harness.launcher.open_contexts(), 0);
}

#[tokio::test]
async fn failed_scrapes_are_skipped() {
    let mut harness = springfield();
    harness.launcher = FakeLauncher::new().fail_url("https://blueline.example");

    let report = harness
        .orchestrator(settings())
        .run(request(&["Springfield, IL"], DiscoveryMode::Search))
        .await
        .unwrap();

    let names: Vec<&str> = report.data.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Upfit"]);
    assert!(!harness
        .model
        .prompts()
        .iter()
        .any(|p| p.contains(EXTRACTION) && p.contains("blueline.example")));
    assert_eq!(harness.launcher.open_contexts(), 0);
}

#[tokio::test]
async fn unreachable_company_urls_are_dropped() {
    let mut harness = springfield();
    harness.probe = FakeProbe::new().reachable("https://acme.example");

    let report = harness
        .orchestrator(settings())
        .run(request(&["Springfield, IL"], DiscoveryMode::Search))
        .await
        .unwrap();

    let names: Vec<&str> = report.data.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Acme Upfit"]);
    assert_eq!(harness.probe.probed().len(), 2);
}

#[tokio::test]
async fn retries_fill_what_they_can_and_keep_the_record() {
    let model = ScriptedModel::new()
        .reply_when("Give me a list of", "Here you go:\n1. Half Shop")
        .reply_when("From the list below", "Half Shop")
        .reply_when(
            "For the vehicle upfitter",
            r#"{"name": "Half Shop", "phone": "NA", "ownerName": "NA", "location": "Andalusia, AL", "description": "NA", "companyUrl": "NA"}"#,
        )
        .replies_when(
            "Find the phone number and company website URL",
            vec![
                r#"{"phone": "334-555-0123", "companyUrl": "NA"}"#,
                r#"{"phone": "NA", "companyUrl": "NA"}"#,
            ],
        );
    let harness = Harness::new(FakeSearch::new(), model);

    let report = harness
        .orchestrator(settings())
        .run(request(&["Andalusia, AL"], DiscoveryMode::ModelOnly))
        .await
        .unwrap();

    assert_eq!(report.results_found, 1);
    let record = &report.data[0];
    assert_eq!(record.name, "Half Shop");
    assert_eq!(record.phone.as_deref(), Some("334-555-0123"));
    assert_eq!(record.company_url, None);
    assert_eq!(record.is_company_url_valid, UrlValidity::Invalid);

    // Model-only batches never touch the search provider or a browser
    assert!(harness.search.calls().is_empty());
    assert_eq!(harness.launcher.launched(), 0);
    assert!(harness.probe.probed().is_empty());
}

#[tokio::test]
async fn browser_pool_failure_fails_the_batch_before_any_work() {
    let mut harness = springfield();
    harness.launcher = FakeLauncher::new().fail_launch_after(1);

    let failure = harness
        .orchestrator(settings())
        .run(request(&["Springfield, IL"], DiscoveryMode::Search))
        .await
        .unwrap_err();

    assert_eq!(failure.state, BatchState::BatchRunning);
    assert!(matches!(failure.error, PipelineError::Resource(_)));
    assert!(failure.partial.is_empty());
    assert!(harness.search.calls().is_empty());
    assert!(harness.sink.writes().is_empty());
    assert_eq!(harness.launcher.open_contexts(), 0);
}

#[tokio::test]
async fn rejected_sink_keeps_the_partial_result() {
    let mut harness = springfield();
    harness.sink = MemorySink::rejecting();

    let failure = harness
        .orchestrator(settings())
        .run(request(&["Springfield, IL"], DiscoveryMode::Search))
        .await
        .unwrap_err();

    assert_eq!(failure.state, BatchState::Persisting);
    assert!(matches!(failure.error, PipelineError::Persistence(_)));
    assert!(!failure.error.is_client_error());
    assert_eq!(failure.partial.len(), 2);
}

#[tokio::test]
async fn empty_city_list_is_an_input_error() {
    let harness = springfield();

    let failure = harness
        .orchestrator(settings())
        .run(request(&[], DiscoveryMode::Search))
        .await
        .unwrap_err();

    assert!(failure.error.is_client_error());
    assert!(harness.search.calls().is_empty());
    assert_eq!(harness.launcher.launched(), 0);
}

#[tokio::test]
async fn chunks_run_one_after_another() {
    let cities = ["Austin, TX", "Boise, ID", "Camden, NJ", "Dayton, OH"];
    let mut search = FakeSearch::new();
    let mut model = ScriptedModel::new();
    let mut probe = FakeProbe::new();

    for city in cities {
        let slug: String = city
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect::<String>()
            .to_lowercase();
        let link = format!("https://{}-upfit.example", slug);
        let name = format!("{} Upfit", &city[..city.find(',').unwrap()]);

        search = search.results(
            &format!("Upfitters in {}", city),
            0,
            vec![SearchResult::new(&name, &link, "Police upfits")],
        );
        model = model
            .reply_when_all(&[RELEVANCE, link.as_str()], "yes")
            .reply_when_all(
                &[EXTRACTION, link.as_str()],
                &format!(r#"{{"name": "{}", "phone": "555-0100"}}"#, name),
            );
        probe = probe.reachable(&link);
    }

    let mut harness = Harness::new(search, model);
    harness.probe = probe;
    harness.launcher = FakeLauncher::new().with_latency(Duration::from_millis(50));
    harness.pool_width = 4;
    let settings = PipelineSettings {
        chunk_size: 2,
        classify_company_urls: false,
        ..settings()
    };

    let report = harness
        .orchestrator(settings)
        .run(request(&cities, DiscoveryMode::Search))
        .await
        .unwrap();

    let names: HashSet<String> = report.data.iter().map(|r| r.name.clone()).collect();
    let expected: HashSet<String> = ["Austin Upfit", "Boise Upfit", "Camden Upfit", "Dayton Upfit"]
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, expected);
    assert_eq!(report.total_cities, 4);

    // The pool could take all four cities, the chunk barrier keeps it at two
    assert_eq!(harness.launcher.peak_in_flight(), 2);

    let loads = harness.launcher.loads();
    assert_eq!(loads.len(), 4);
    let first_chunk: HashSet<&str> = loads[..2].iter().map(|l| l.as_str()).collect();
    assert_eq!(
        first_chunk,
        HashSet::from(["https://austin-upfit.example/", "https://boise-upfit.example/"])
    );
    assert!(!harness
        .model
        .prompts()
        .iter()
        .any(|p| p.contains(VALIDITY)));
}
