use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use churn_survival::{
    generate_users, metrics::harrell_c_index, CoxModel, KaplanMeier, LogRankTest, StudyConfig,
    SurvivalData, UserRecord,
};

fn cohort(n_users: usize) -> Vec<UserRecord> {
    generate_users(&StudyConfig::new().with_n_users(n_users)).unwrap()
}

fn durations(users: &[UserRecord]) -> (Vec<f64>, Vec<bool>) {
    users.iter().map(|u| (u.time_observed, u.churned)).unzip()
}

fn benchmark_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_users");

    for &n_users in [500, 1500, 5000].iter() {
        let config = StudyConfig::new().with_n_users(n_users);
        group.bench_with_input(BenchmarkId::from_parameter(n_users), &config, |b, config| {
            b.iter(|| generate_users(black_box(config)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_kaplan_meier(c: &mut Criterion) {
    let mut group = c.benchmark_group("kaplan_meier");

    for &n_users in [500, 1500, 5000].iter() {
        let (times, events) = durations(&cohort(n_users));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_users),
            &(times, events),
            |b, (times, events)| {
                b.iter(|| KaplanMeier::fit("bench", black_box(times), black_box(events), 0.95).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_log_rank(c: &mut Criterion) {
    let users = cohort(1500);
    let (premium, free): (Vec<UserRecord>, Vec<UserRecord>) =
        users.into_iter().partition(|u| u.is_premium());
    let (t_free, e_free) = durations(&free);
    let (t_prem, e_prem) = durations(&premium);

    c.bench_function("log_rank_1500", |b| {
        b.iter(|| {
            LogRankTest::compare(
                black_box(&t_free),
                black_box(&e_free),
                black_box(&t_prem),
                black_box(&e_prem),
            )
            .unwrap()
        })
    });
}

fn benchmark_cox_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cox_fitting");

    for &n_users in [500, 1500, 5000].iter() {
        let data = SurvivalData::from_records(&cohort(n_users)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n_users), &data, |b, data| {
            b.iter(|| {
                let mut model = CoxModel::new();
                model.fit(black_box(data)).unwrap();
            });
        });
    }
    group.finish();
}

fn benchmark_concordance(c: &mut Criterion) {
    let data = SurvivalData::from_records(&cohort(1500)).unwrap();
    let mut model = CoxModel::new();
    model.fit(&data).unwrap();
    let risk_scores = model.predict(data.covariates()).unwrap();

    c.bench_function("harrell_c_index_1500", |b| {
        b.iter(|| {
            harrell_c_index(
                black_box(risk_scores.view()),
                black_box(data.times()),
                black_box(data.events()),
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_generation,
    benchmark_kaplan_meier,
    benchmark_log_rank,
    benchmark_cox_fitting,
    benchmark_concordance
);
criterion_main!(benches);
