#![allow(dead_code)]

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use canister::{CatalogBuilder, Container, InjectionPoint, Provider, ScopeKind};

struct Settings;
struct Pool(Arc<Settings>);
struct Repository(Arc<Pool>);
struct Service(Arc<Repository>);
struct Handler(Arc<Service>);

fn catalog_builder() -> CatalogBuilder {
    CatalogBuilder::new()
        .provide(Provider::new::<Settings, _>("settings", ScopeKind::Singleton, |_| Ok(Settings)))
        .provide(
            Provider::new::<Pool, _>("pool", ScopeKind::Singleton, |cx| Ok(Pool(cx.get()?)))
                .inject(InjectionPoint::required::<Settings>()),
        )
        .provide(
            Provider::new::<Repository, _>("repository", ScopeKind::Dependent, |cx| Ok(Repository(cx.get()?)))
                .inject(InjectionPoint::required::<Pool>()),
        )
        .provide(
            Provider::new::<Service, _>("service", ScopeKind::Dependent, |cx| Ok(Service(cx.get()?)))
                .inject(InjectionPoint::required::<Repository>()),
        )
        .provide(
            Provider::new::<Handler, _>("handler", ScopeKind::Dependent, |cx| Ok(Handler(cx.get()?)))
                .inject(InjectionPoint::required::<Service>()),
        )
}

fn container_new(builder: fn() -> CatalogBuilder) -> Container {
    Container::new(builder().build().unwrap())
}

fn resolve_dependent_chain(container: &Container) {
    let _ = container.instance::<Handler>().unwrap().get().unwrap();
}

fn resolve_singleton(container: &Container) {
    let _ = container.instance::<Pool>().unwrap().get().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let warm = container_new(catalog_builder);
    resolve_singleton(&warm);

    c.bench_function("container_new", |b| b.iter(|| container_new(catalog_builder)))
        .bench_function("resolve_singleton_warm", |b| b.iter(|| resolve_singleton(&warm)))
        .bench_function("resolve_dependent_chain", |b| b.iter(|| resolve_dependent_chain(&warm)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
