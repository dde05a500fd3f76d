use kestrel_script_host::assets::ImageHandle;
use kestrel_script_host::config::{HostConfig, ScriptConfig};
use kestrel_script_host::interop::HostValue;
use kestrel_script_host::scripts::{EntryPoint, InstanceState, ScriptHost};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn host_in(dir: &Path, startup: &[&str]) -> ScriptHost {
    let mut config = HostConfig::default();
    config.scripts = ScriptConfig {
        startup: startup.iter().map(|name| name.to_string()).collect(),
        ..ScriptConfig::with_dir(dir)
    };
    config.assets.dir = dir.to_path_buf();
    ScriptHost::new(&config).expect("host should initialise")
}

fn write_script(dir: &Path, name: &str, source: &str) {
    fs::write(dir.join(format!("{name}.rhai")), source).expect("write script");
}

fn setup(scripts: &[(&str, &str)]) -> (TempDir, ScriptHost) {
    let dir = tempdir().expect("temp dir");
    for (name, source) in scripts {
        write_script(dir.path(), name, source);
    }
    let host = host_in(dir.path(), &[]);
    (dir, host)
}

fn frame(host: &mut ScriptHost, surface: &ImageHandle) {
    host.update();
    host.draw(surface).expect("scan should succeed");
}

fn data(host: &ScriptHost, name: &str, key: &str) -> Option<HostValue> {
    host.instance(name).expect("instance registered").data().get(key)
}

#[test]
fn smiley_counts_ten_updates() {
    let (_dir, mut host) = setup(&[(
        "Smiley",
        r#"
            fn OnInit() { Data.Set("x", 0); }
            fn OnUpdate() { Data.Set("x", Data.Get("x") + 1); }
        "#,
    )]);
    host.add("Smiley");

    for _ in 0..10 {
        host.update();
    }

    assert_eq!(data(&host, "Smiley", "x"), Some(HostValue::Int(10)));
    assert_eq!(host.frame(), 10);
}

#[test]
fn entry_point_table_holds_exactly_the_defined_subset() {
    let (_dir, mut host) = setup(&[
        ("InitAndDraw", "fn OnInit() {} fn OnDraw() {} fn helper() {}"),
        ("Nothing", "let speed = 3;"),
        ("Everything", "fn OnInit() {} fn OnUpdate() {} fn OnDraw() {} fn OnMessage(msg) {}"),
    ]);
    host.add("InitAndDraw");
    host.add("Nothing");
    host.add("Everything");

    assert_eq!(host.instance("InitAndDraw").unwrap().entry_points(), vec![EntryPoint::OnInit, EntryPoint::OnDraw]);
    assert!(host.instance("Nothing").unwrap().entry_points().is_empty());
    assert_eq!(host.instance("Everything").unwrap().entry_points(), EntryPoint::ALL.to_vec());
    for instance in host.instances() {
        assert_eq!(instance.state(), InstanceState::Ready);
        assert!(instance.is_running());
    }
}

#[test]
fn entry_points_may_be_bound_to_closures() {
    let (_dir, mut host) = setup(&[("Closure", r#"let OnUpdate = || { Data.Set("ran", true); };"#)]);
    host.add("Closure");

    assert!(host.instance("Closure").unwrap().has_entry_point(EntryPoint::OnUpdate));
    host.update();

    assert_eq!(data(&host, "Closure", "ran"), Some(HostValue::Bool(true)));
}

#[test]
fn top_level_runs_once_per_load() {
    let (_dir, mut host) = setup(&[(
        "Counter",
        r#"
            Data.Set("runs", (Data.Get("runs") ?? 0) + 1);
            fn OnUpdate() {}
        "#,
    )]);
    host.add("Counter");
    for _ in 0..5 {
        host.update();
    }
    assert_eq!(data(&host, "Counter", "runs"), Some(HostValue::Int(1)));
}

#[test]
fn runtime_error_stops_only_the_failing_instance() {
    let (_dir, mut host) = setup(&[
        ("Broken", r#"fn OnUpdate() { throw "boom"; }"#),
        ("Healthy", r#"fn OnUpdate() { Data.Set("n", (Data.Get("n") ?? 0) + 1); }"#),
    ]);
    host.add("Broken");
    host.add("Healthy");
    let surface = ImageHandle::new(8, 8);

    for _ in 0..3 {
        frame(&mut host, &surface);
    }

    let broken = host.instance("Broken").unwrap();
    assert!(!broken.is_running());
    assert_eq!(broken.state(), InstanceState::Ready, "a dispatch failure does not fault the instance");
    assert_eq!(host.len(), 2, "a stopped instance stays registered");
    assert!(host.instance("Healthy").unwrap().is_running());
    assert_eq!(data(&host, "Healthy", "n"), Some(HostValue::Int(3)));
}

#[test]
fn failing_oninit_still_marks_initialized() {
    let (_dir, mut host) = setup(&[(
        "BadInit",
        r#"
            fn OnInit() { Data.Set("inits", (Data.Get("inits") ?? 0) + 1); undefined_call(); }
            fn OnUpdate() { Data.Set("updated", true); }
        "#,
    )]);
    host.add("BadInit");

    host.update();
    host.update();

    let instance = host.instance("BadInit").unwrap();
    assert!(instance.is_initialized());
    assert!(!instance.is_running());
    assert_eq!(instance.data().get("inits"), Some(HostValue::Int(1)));
    assert_eq!(instance.data().get("updated"), None);
}

#[test]
fn self_removal_waits_for_the_draw_phase() {
    let (_dir, mut host) = setup(&[
        (
            "Quitter",
            r#"
                fn OnUpdate() { Data.Set("updates", (Data.Get("updates") ?? 0) + 1); Script.Remove(); }
                fn OnDraw() { Data.Set("draws", (Data.Get("draws") ?? 0) + 1); }
            "#,
        ),
        ("Stayer", r#"fn OnUpdate() { Data.Set("n", (Data.Get("n") ?? 0) + 1); }"#),
    ]);
    host.add("Quitter");
    host.add("Stayer");
    let quitter_data = host.instance("Quitter").unwrap().data().clone();
    let surface = ImageHandle::new(8, 8);

    host.update();
    assert_eq!(host.len(), 2, "removal is deferred during update");
    assert_eq!(host.pending_removals(), 1);

    host.draw(&surface).expect("scan");
    assert_eq!(host.len(), 1);
    assert!(host.instance("Quitter").is_none());
    assert_eq!(quitter_data.get("draws"), Some(HostValue::Int(1)), "draw still ran in the removal frame");

    for _ in 0..3 {
        frame(&mut host, &surface);
    }
    assert_eq!(quitter_data.get("updates"), Some(HostValue::Int(1)));
    assert_eq!(quitter_data.get("draws"), Some(HostValue::Int(1)));
    assert_eq!(data(&host, "Stayer", "n"), Some(HostValue::Int(4)));
}

#[test]
fn host_side_remove_is_deferred_too() {
    let (_dir, mut host) = setup(&[("Idle", "fn OnUpdate() {}")]);
    let id = host.add("Idle");
    host.remove(id);
    assert_eq!(host.len(), 1);
    host.draw(&ImageHandle::new(4, 4)).expect("scan");
    assert!(host.is_empty());
}

#[test]
fn scripts_added_during_update_join_the_same_pass() {
    let (_dir, mut host) = setup(&[
        ("Spawner", r#"fn OnInit() { Host.Add("Child"); }"#),
        ("Child", r#"fn OnInit() { Data.Set("init", true); } fn OnUpdate() { Data.Set("ticks", (Data.Get("ticks") ?? 0) + 1); }"#),
    ]);
    host.add("Spawner");

    host.update();

    assert_eq!(host.len(), 2);
    let child = host.instance("Child").expect("child added");
    assert!(child.is_initialized());
    assert_eq!(child.data().get("init"), Some(HostValue::Bool(true)));
    assert_eq!(child.data().get("ticks"), Some(HostValue::Int(1)));
}

#[test]
fn missing_script_is_registered_faulted() {
    let dir = tempdir().expect("temp dir");
    let mut host = host_in(dir.path(), &[]);

    host.add("Ghost");

    let ghost = host.instance("Ghost").expect("still registered");
    assert_eq!(ghost.state(), InstanceState::Faulted);
    assert!(!ghost.is_running());
    assert!(ghost.last_error().is_some());
    assert!(ghost.entry_points().is_empty());

    host.update();
    assert!(!host.instance("Ghost").unwrap().is_initialized(), "OnInit waits for a successful load");
}

#[test]
fn faulted_script_recovers_when_its_file_appears() {
    let dir = tempdir().expect("temp dir");
    let mut host = host_in(dir.path(), &[]);
    let surface = ImageHandle::new(8, 8);
    host.add("Late");
    frame(&mut host, &surface);

    write_script(dir.path(), "Late", r#"fn OnInit() { Data.Set("init", true); }"#);
    host.draw(&surface).expect("scan");
    assert_eq!(host.instance("Late").unwrap().state(), InstanceState::Ready);

    host.update();
    assert_eq!(data(&host, "Late", "init"), Some(HostValue::Bool(true)));
}

#[test]
fn messages_reach_only_the_named_instances() {
    let (_dir, mut host) = setup(&[
        ("Inbox", r#"fn OnMessage(msg) { Data.Set("last", msg); }"#),
        ("Other", r#"fn OnMessage(msg) { Data.Set("last", msg); }"#),
    ]);
    host.add("Inbox");
    host.add("Other");

    let payload = HostValue::List(vec![HostValue::from("hello"), HostValue::Int(2)]);
    assert_eq!(host.send_message("Inbox", payload.clone()), 1);
    assert_eq!(host.send_message("Nobody", HostValue::Unit), 0);

    assert_eq!(data(&host, "Inbox", "last"), Some(payload));
    assert_eq!(data(&host, "Other", "last"), None);
}

#[test]
fn frame_counter_advances_after_each_update_pass() {
    let (_dir, mut host) = setup(&[("Clock", r#"fn OnUpdate() { Data.Set("seen", Host.Frame()); }"#)]);
    host.add("Clock");
    for _ in 0..3 {
        host.update();
    }
    assert_eq!(data(&host, "Clock", "seen"), Some(HostValue::Int(2)));
    assert_eq!(host.frame(), 3);
}

#[test]
fn reset_restores_startup_scripts() {
    let dir = tempdir().expect("temp dir");
    write_script(dir.path(), "Smiley", r#"fn OnInit() { Data.Set("x", 0); }"#);
    write_script(dir.path(), "Extra", "fn OnUpdate() {}");
    let mut host = host_in(dir.path(), &["Smiley"]);
    host.add_startup_scripts();
    host.add("Extra");
    host.update();

    host.reset();

    assert_eq!(host.len(), 1);
    let smiley = host.instance("Smiley").unwrap();
    assert!(!smiley.is_initialized());
    assert!(smiley.data().is_empty(), "reset builds fresh instances");
}

#[test]
fn print_output_does_not_disturb_dispatch() {
    let (_dir, mut host) = setup(&[("Chatty", r#"fn OnUpdate() { print("tick"); debug(Host.Frame()); Host.Log("hello"); }"#)]);
    host.add("Chatty");
    host.update();
    assert!(host.instance("Chatty").unwrap().is_running());
}

#[test]
fn unbounded_rand_range_stops_only_the_caller() {
    let (_dir, mut host) = setup(&[
        ("Wild", r#"fn OnUpdate() { Data.Set("r", Host.Rand(-1.7e308, 1.7e308)); }"#),
        ("Calm", r#"fn OnUpdate() { Data.Set("r", Host.Rand(0, 1)); }"#),
    ]);
    host.add("Wild");
    host.add("Calm");

    host.update();
    host.update();

    let wild = host.instance("Wild").unwrap();
    assert!(!wild.is_running());
    assert_eq!(wild.data().get("r"), None);
    let calm = host.instance("Calm").unwrap();
    assert!(calm.is_running());
    assert!(matches!(calm.data().get("r"), Some(HostValue::Float(r)) if (0.0..1.0).contains(&r)));
}
