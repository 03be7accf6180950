//! Benchmarks for invocation parsing, string expansion and tree resolution

use config_resolver_core::providers::StaticSource;
use config_resolver_core::{parse_invocation, ConfigSources, Expander, Resolver};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn bench_sources() -> ConfigSources {
    let mut sources = ConfigSources::new();
    sources.insert(
        "vault".to_string(),
        Arc::new(
            StaticSource::new()
                .with_value("db/password", "s3cr3t")
                .with_value("db/port", 5432),
        ),
    );
    sources
}

fn bench_env() -> HashMap<String, String> {
    HashMap::from([("DB_HOST".to_string(), "db.internal".to_string())])
}

fn bench_parse_invocation(c: &mut Criterion) {
    c.bench_function("parse_invocation", |b| {
        b.iter(|| parse_invocation(black_box("vault:db/password?version=3&cache=true&tag=a&tag=b")))
    });
}

fn bench_expand(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let sources = bench_sources();
    let env = bench_env();

    c.bench_function("expand_mixed_string", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut expander = Expander::new(&sources, &env);
                expander
                    .expand(black_box("postgres://${DB_HOST}:${vault:db/port}/app?p=$$x"))
                    .await
            })
        })
    });
}

fn bench_resolve_tree(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let sources = bench_sources();
    let resolver = Resolver::default()
        .with_env(bench_env())
        .with_config(config_resolver_core::ResolverConfig::default().with_watch_for_updates(false));

    let services: Vec<Value> = (0..50)
        .map(|i| {
            json!({
                "name": format!("service-{i}"),
                "host": "$DB_HOST",
                "port": "$vault:db/port",
                "password": "${vault:db/password}",
                "replicas": i,
            })
        })
        .collect();
    let tree = json!({ "services": services });

    c.bench_function("resolve_tree_50_services", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let resolved = resolver
                    .resolve_with_sources(black_box(tree.clone()), &sources)
                    .await
                    .unwrap();
                resolved.closer.close().await.unwrap();
                resolved.config
            })
        })
    });
}

criterion_group!(benches, bench_parse_invocation, bench_expand, bench_resolve_tree);
criterion_main!(benches);
