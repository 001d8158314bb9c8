use std::sync::Arc;

use sprout_core::{
    ApplicationContext, Autowired, Bean, BeanError, Condition, OptionArg, VarArgs,
};

struct Marker {
    label: &'static str,
}

fn marker(label: &'static str) -> Bean<Marker> {
    Bean::object(Marker { label }).with_name(label)
}

struct Server {
    addr: String,
}

struct Endpoint {
    path: String,
    addr: String,
}

fn new_server(addr: String) -> Result<Server, BeanError> {
    Ok(Server { addr })
}

fn server_endpoint(server: Arc<Server>, path: String) -> Result<Endpoint, BeanError> {
    Ok(Endpoint {
        path,
        addr: server.addr.clone(),
    })
}

#[test]
fn test_profile_gating() {
    for (profile, expected) in [("test", true), ("", false), ("prod", false)] {
        let mut ctx = ApplicationContext::new();
        ctx.set_profile(profile);
        ctx.register(marker("gated").with_condition(Condition::on_profile("test")));
        ctx.auto_wire().unwrap();
        assert_eq!(
            ctx.try_get_bean_named::<Marker>("gated").is_some(),
            expected,
            "profile {profile:?}"
        );
    }
}

#[test]
fn test_on_bean_chain_with_missing_root_excludes_everyone() {
    let mut ctx = ApplicationContext::new();
    ctx.register(marker("link-0").with_condition(Condition::on_bean("nonexistent")));
    for i in 1..20 {
        let previous = format!("link-{}", i - 1);
        let name: &'static str = Box::leak(format!("link-{i}").into_boxed_str());
        ctx.register(marker(name).with_condition(Condition::on_bean(previous)));
    }
    ctx.auto_wire().unwrap();
    assert_eq!(ctx.bean_definitions().len(), 0);
}

#[test]
fn test_condition_fixed_point_ignores_registration_order() {
    // the dependent is registered before the bean its condition references
    let mut ctx = ApplicationContext::new();
    ctx.register(marker("follower").with_condition(Condition::on_bean("leader")));
    ctx.register(marker("leader"));
    ctx.auto_wire().unwrap();
    let names: Vec<_> = ctx.bean_definitions().into_iter().map(|d| d.name).collect();
    assert!(names.contains(&"follower".to_string()));
    assert!(names.contains(&"leader".to_string()));
}

#[test]
fn test_on_missing_bean_waits_for_the_referenced_decision() {
    let mut ctx = ApplicationContext::new();
    // "fallback" must observe that "primary" was excluded, not just unvisited
    ctx.register(marker("fallback").with_condition(Condition::on_missing_bean("primary")));
    ctx.register(marker("primary").with_condition(Condition::on_property("primary.enabled")));
    ctx.auto_wire().unwrap();
    assert!(ctx.try_get_bean_named::<Marker>("fallback").is_some());
    assert!(ctx.try_get_bean_named::<Marker>("primary").is_none());

    let mut ctx = ApplicationContext::new();
    ctx.set_property("primary.enabled", true);
    ctx.register(marker("fallback").with_condition(Condition::on_missing_bean("primary")));
    ctx.register(marker("primary").with_condition(Condition::on_property("primary.enabled")));
    ctx.auto_wire().unwrap();
    assert!(ctx.try_get_bean_named::<Marker>("fallback").is_none());
    assert!(ctx.try_get_bean_named::<Marker>("primary").is_some());
}

#[test]
fn test_type_name_selector_matches_exported_capability() {
    let mut ctx = ApplicationContext::new();
    ctx.set_property("server.addr", "0.0.0.0:80");
    ctx.register(Bean::factory_with(new_server, &["${server.addr}"]));
    ctx.register(marker("monitor").with_condition(Condition::on_bean("*Server")));
    ctx.auto_wire().unwrap();
    assert!(ctx.try_get_bean_named::<Marker>("monitor").is_some());
}

#[test]
fn test_method_bean_binds_parent_and_arguments() {
    let mut ctx = ApplicationContext::new();
    ctx.set_property("server.addr", "10.0.0.1:80");
    ctx.set_property("server.path", "/healthz");
    let parent = ctx.register(Bean::factory_with(new_server, &["${server.addr}"]));
    ctx.register(Bean::method_with(parent, server_endpoint, &["${server.path}"]));
    ctx.auto_wire().unwrap();

    let endpoint = ctx.get_bean::<Endpoint>().unwrap();
    assert_eq!(endpoint.path, "/healthz");
    assert_eq!(endpoint.addr, "10.0.0.1:80");
}

#[test]
fn test_method_bean_is_excluded_with_its_parent() {
    let mut ctx = ApplicationContext::new();
    ctx.set_property("server.addr", "10.0.0.1:80");
    ctx.set_property("server.path", "/healthz");
    let parent = ctx.register(
        Bean::factory_with(new_server, &["${server.addr}"])
            .with_condition(Condition::on_profile("prod")),
    );
    // no condition of its own; a passing one would not help either
    ctx.register(Bean::method_with(parent, server_endpoint, &["${server.path}"]));
    ctx.register(
        Bean::method_with(parent, server_endpoint, &["${server.path}"])
            .with_name("insistent")
            .with_condition(Condition::on_profile("")),
    );
    ctx.auto_wire().unwrap();

    assert!(ctx.try_get_bean::<Endpoint>().is_none());
    assert_eq!(ctx.bean_definitions().len(), 0);
}

#[test]
fn test_option_arguments_follow_their_own_conditions() {
    struct Cluster {
        name: String,
        opts: Vec<String>,
    }

    fn new_cluster(name: String, opts: Vec<String>) -> Result<Cluster, BeanError> {
        Ok(Cluster { name, opts })
    }

    let mut ctx = ApplicationContext::new();
    ctx.set_property("cluster.name", "main");
    ctx.set_property("cluster.region", "eu-1");
    ctx.set_property("feature.cache", true);
    let options = vec![
        OptionArg::new(|| Ok("cache".to_string()), &[])
            .with_condition(Condition::on_property("feature.cache")),
        OptionArg::new(|| Ok("tls".to_string()), &[])
            .with_condition(Condition::on_profile("prod")),
        OptionArg::new(
            |region: String| Ok(format!("region={region}")),
            &["${cluster.region}"],
        ),
    ];
    ctx.register(Bean::factory_opts(new_cluster, &["${cluster.name}"], options));
    ctx.auto_wire().unwrap();

    let cluster = ctx.get_bean::<Cluster>().unwrap();
    assert_eq!(cluster.name, "main");
    // the profile-gated option is silently omitted
    assert_eq!(cluster.opts, vec!["cache".to_string(), "region=eu-1".to_string()]);
}

#[test]
fn test_variadic_factory_parameter() {
    struct Pool {
        hosts: Vec<String>,
    }

    fn new_pool(first: String, rest: VarArgs<String>) -> Result<Pool, BeanError> {
        let mut hosts = vec![first];
        hosts.extend(rest);
        Ok(Pool { hosts })
    }

    let mut ctx = ApplicationContext::new();
    ctx.set_property("host.a", "a:1");
    ctx.set_property("host.b", "b:2");
    ctx.set_property("host.c", "c:3");
    ctx.register(Bean::factory_with(
        new_pool,
        &["${host.a}", "${host.b}", "${host.c}"],
    ));
    ctx.auto_wire().unwrap();

    let pool = ctx.get_bean::<Pool>().unwrap();
    assert_eq!(pool.hosts, vec!["a:1", "b:2", "c:3"]);
}

#[test]
fn test_autowired_struct_assembly_defers_until_dependencies_exist() {
    struct Wired {
        server: Arc<Server>,
        limit: u64,
    }

    impl Autowired for Wired {
        fn assemble(ctx: &ApplicationContext) -> Result<Self, BeanError> {
            Ok(Self {
                server: ctx.wire("")?,
                limit: ctx.bind_property("${wired.limit:=10}")?,
            })
        }
    }

    let mut ctx = ApplicationContext::new();
    ctx.set_property("server.addr", "1.2.3.4:9");
    // the autowired struct registers first and must wait for Server
    ctx.register(Bean::<Wired>::autowired());
    ctx.register(Bean::factory_with(new_server, &["${server.addr}"]));
    ctx.auto_wire().unwrap();

    let wired = ctx.get_bean::<Wired>().unwrap();
    assert_eq!(wired.server.addr, "1.2.3.4:9");
    assert_eq!(wired.limit, 10);
}

#[test]
fn test_deterministic_outcome_under_randomized_registration() {
    use rand::seq::SliceRandom;

    fn register_slot(ctx: &mut ApplicationContext, slot: usize) {
        match slot {
            0 => ctx.register(marker("db")),
            1 => ctx.register(marker("cache").with_condition(Condition::on_bean("db"))),
            2 => ctx.register(
                marker("tracing").with_condition(Condition::on_property("obs.enabled")),
            ),
            3 => ctx.register(
                marker("metrics").with_condition(Condition::on_missing_bean("tracing")),
            ),
            4 => ctx.register(marker("backup").with_condition(Condition::on_missing_bean("db"))),
            _ => unreachable!(),
        };
    }

    let mut rng = rand::thread_rng();
    let mut expected: Option<Vec<String>> = None;
    for _ in 0..20 {
        let mut order: Vec<usize> = (0..5).collect();
        order.shuffle(&mut rng);

        let mut ctx = ApplicationContext::new();
        for &slot in &order {
            register_slot(&mut ctx, slot);
        }
        ctx.auto_wire().unwrap();

        let mut names: Vec<String> =
            ctx.bean_definitions().into_iter().map(|d| d.name).collect();
        names.sort();
        match &expected {
            Some(previous) => assert_eq!(previous, &names, "order {order:?}"),
            None => expected = Some(names),
        }
    }
    assert_eq!(
        expected.unwrap(),
        vec!["cache".to_string(), "db".to_string(), "metrics".to_string()]
    );
}

#[test]
fn test_surviving_bean_can_reference_a_marker_field() {
    let mut ctx = ApplicationContext::new();
    ctx.register(marker("solo"));
    ctx.auto_wire().unwrap();
    assert_eq!(ctx.get_bean::<Marker>().unwrap().label, "solo");
}
