use chrono::NaiveDate;
use hydrosim::engine::timeseries::Instant;
use hydrosim::standard_simulation_builder;
use is_close::is_close;

fn date(day: u32) -> Instant {
    NaiveDate::from_ymd_opt(2020, 3, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn builds_with_standard_models() {
    let mut builder = standard_simulation_builder();
    builder
        .with_node("n1", "Top")
        .with_node("n2", "Outlet")
        .with_link("l1", "Reach", Some("n1"), Some("n2"))
        .with_subarea("s1", "Hillslope", "l1", 86.4)
        .with_runoff_model("UnitRunoff")
        .with_routing_model("NoRouting")
        .with_span(date(1), date(10));
    let mut simulation = builder.build().unwrap();
    simulation.play_values("subarea.s1.P", &[4.0; 10]).unwrap();
    simulation.record("Catchment.StreamflowRate").unwrap();
    simulation.execute(true).unwrap();

    let flow = simulation
        .get_recorded("Catchment.StreamflowRate")
        .unwrap()
        .to_vec();
    assert_eq!(flow.len(), 10);
    assert!(flow.iter().all(|q| is_close!(*q, 4.0)));
}
