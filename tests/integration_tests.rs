use churn_survival::{
    analysis::RetentionAnalysis,
    config::{OutputPaths, StudyConfig},
    export,
    kaplan_meier::KaplanMeier,
    logrank::LogRankTest,
    metrics::ModelMetrics,
    plot, report,
    simulate::{generate_users, SubscriptionTier},
    CoxModel, SurvivalData, SurvivalError,
};
use ndarray::{Array1, Array2};
use approx::assert_relative_eq;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_synthetic_data(n_samples: usize, n_features: usize, seed: u64) -> SurvivalData {
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    let mut rng = StdRng::seed_from_u64(seed);

    // Generate random covariates
    let mut covariates_vec = Vec::with_capacity(n_samples * n_features);
    for _ in 0..(n_samples * n_features) {
        covariates_vec.push(rng.gen_range(-2.0..2.0));
    }
    let covariates = Array2::from_shape_vec((n_samples, n_features), covariates_vec).unwrap();

    // Generate survival times based on covariates
    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    let true_coefficients = Array1::from(vec![0.8, -0.6, 0.2]); // First 3 features are relevant

    for i in 0..n_samples {
        let linear_pred: f64 = if n_features >= 3 {
            covariates.slice(ndarray::s![i, 0..3]).dot(&true_coefficients)
        } else {
            covariates.slice(ndarray::s![i, ..]).sum()
        };

        let hazard = linear_pred.exp();
        let time = (-(1.0 - rng.r#gen::<f64>()).ln() / (0.1 * hazard)).max(0.1);
        let censoring_time = rng.gen_range(1.0..10.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    SurvivalData::new(times, events, covariates).unwrap()
}

#[test]
fn test_cox_model_basic_functionality() {
    init_logging();
    let data = create_synthetic_data(400, 5, 42);

    let mut model = CoxModel::new()
        .with_max_iterations(100)
        .with_tolerance(1e-9);

    assert!(model.fit(&data).is_ok());
    assert!(model.is_fitted());

    let coefficients = model.coefficients().unwrap();
    assert_eq!(coefficients.len(), 5);

    // strong effects come back with the right sign
    assert!(coefficients[0] > 0.0);
    assert!(coefficients[1] < 0.0);

    let predictions = model.predict(data.covariates()).unwrap();
    assert_eq!(predictions.len(), 400);
    assert!(predictions.iter().all(|&x| x.is_finite()));
}

#[test]
fn test_cox_model_with_ridge_regularization() {
    let data = create_synthetic_data(150, 6, 123);

    // the penalty acts on standardized coefficients, compare on that scale
    let (_, stds) = data.clone().standardize_covariates().unwrap();
    let standardized_norm = |model: &CoxModel| -> f64 {
        let coefs = model.coefficients().unwrap();
        coefs.iter().zip(stds.iter()).map(|(b, s)| (b * s).powi(2)).sum()
    };

    let mut plain = CoxModel::new();
    plain.fit(&data).unwrap();

    let mut ridge = CoxModel::new().with_l2_penalty(5.0);
    ridge.fit(&data).unwrap();

    assert!(standardized_norm(&ridge) < standardized_norm(&plain));
}

#[test]
fn test_model_evaluation_metrics() {
    let data = create_synthetic_data(200, 3, 321);

    let mut model = CoxModel::new();
    model.fit(&data).unwrap();

    let risk_scores = model.predict(data.covariates()).unwrap();
    let metrics = ModelMetrics::compute(&data, risk_scores.view(), 3).unwrap();

    // real signal in the data, so better than a coin flip
    assert!(metrics.concordance > 0.5 && metrics.concordance <= 1.0);
    assert!(metrics.log_likelihood.is_finite());
    assert!(metrics.aic > 0.0 && metrics.aic.is_finite());

    let summary = model.summary().unwrap();
    assert_relative_eq!(summary.concordance, metrics.concordance, epsilon = 1e-12);
    assert_relative_eq!(summary.log_likelihood, metrics.log_likelihood, epsilon = 1e-9);
    assert!(summary.lr_p_value < 0.05);
}

#[test]
fn test_every_record_is_censored_at_the_horizon() {
    let config = StudyConfig::default();
    let users = generate_users(&config).unwrap();
    assert_eq!(users.len(), 1500);

    for user in &users {
        assert!(user.time_observed <= config.study_horizon);
        assert_eq!(user.churned, user.time_to_churn <= config.study_horizon);
        if user.churned {
            assert_eq!(user.time_observed, user.time_to_churn);
        } else {
            assert_eq!(user.time_observed, config.study_horizon);
        }
    }
}

#[test]
fn test_survival_curve_properties() {
    let config = StudyConfig::default();
    let users = generate_users(&config).unwrap();
    let times: Vec<f64> = users.iter().map(|u| u.time_observed).collect();
    let events: Vec<bool> = users.iter().map(|u| u.churned).collect();
    let km = KaplanMeier::fit("Overall", &times, &events, 0.95).unwrap();

    assert_eq!(km.survival_at(0.0), Some(1.0));

    let mut previous = 1.0;
    for step in km.steps() {
        assert!(step.survival <= previous);
        assert!((0.0..=1.0).contains(&step.survival));
        assert!(step.lower <= step.survival && step.survival <= step.upper);
        previous = step.survival;
    }

    let mut previous = 1.0;
    for checkpoint in km.checkpoints(&config.checkpoints) {
        let s = checkpoint.survival.unwrap();
        assert!((0.0..=1.0).contains(&s));
        assert!(s <= previous);
        previous = s;
    }
}

#[test]
fn test_log_rank_is_deterministic() {
    let config = StudyConfig::default();

    let run = || {
        let users = generate_users(&config).unwrap();
        let (premium, free): (Vec<_>, Vec<_>) = users
            .iter()
            .partition(|u| u.subscription_tier == SubscriptionTier::Premium);
        let t_free: Vec<f64> = free.iter().map(|u| u.time_observed).collect();
        let e_free: Vec<bool> = free.iter().map(|u| u.churned).collect();
        let t_prem: Vec<f64> = premium.iter().map(|u| u.time_observed).collect();
        let e_prem: Vec<bool> = premium.iter().map(|u| u.churned).collect();
        LogRankTest::compare(&t_free, &e_free, &t_prem, &e_prem).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.statistic.to_bits(), second.statistic.to_bits());
    assert_eq!(first.p_value.to_bits(), second.p_value.to_bits());
}

#[test]
fn test_default_study() {
    init_logging();
    let config = StudyConfig::default();
    let analysis = RetentionAnalysis::run(&config).unwrap();

    // hazard ratios are exactly exp(coef)
    assert_eq!(analysis.cox.rows.len(), 5);
    for row in &analysis.cox.rows {
        assert_eq!(row.hazard_ratio, row.coef.exp());
    }

    // premium outlives free; a median that is never reached counts as infinite
    let free = analysis.by_subscription.a.median().expect("free median is reached");
    match analysis.by_subscription.b.median() {
        None => {}
        Some(premium) => assert!(premium > free),
    }
    assert!(analysis.by_subscription.test.is_significant(config.significance_level));
    assert!(analysis.by_activity.test.is_significant(config.significance_level));

    // simulated premium effect is a 0.43 hazard multiplier
    let premium = &analysis.premium_effect;
    assert!(premium.hazard_ratio > 0.25 && premium.hazard_ratio < 0.7);
    assert!(premium.hr_lower < premium.hazard_ratio && premium.hazard_ratio < premium.hr_upper);
    assert!(premium.risk_reduction_pct > 0.0);
}

#[test]
fn test_full_pipeline_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths::new(dir.path().join("output"));
    for d in paths.directories() {
        std::fs::create_dir_all(d).unwrap();
    }

    let config = StudyConfig::new().with_n_users(400).with_seed(5);
    let analysis = RetentionAnalysis::run(&config).unwrap();

    export::write_users_csv(&analysis.users, paths.users_csv()).unwrap();
    plot::write_all(&analysis, &paths).unwrap();
    let summary = report::render_summary(&analysis, &config);
    report::write_summary(&summary, paths.summary_text()).unwrap();
    export::write_summary_json(&analysis, &config, paths.summary_json()).unwrap();

    let csv = std::fs::read_to_string(paths.users_csv()).unwrap();
    assert_eq!(csv.lines().count(), 401);
    for name in [plot::KM_OVERALL, plot::KM_BY_SUBSCRIPTION, plot::KM_BY_ACTIVITY, plot::COX_HAZARD_RATIOS] {
        let svg = std::fs::read_to_string(paths.plot(name)).unwrap();
        assert!(svg.starts_with("<svg"));
    }
    assert_eq!(std::fs::read_to_string(paths.summary_text()).unwrap(), summary);
    assert!(paths.summary_json().exists());
}

#[test]
fn test_missing_output_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths::new(dir.path().join("missing"));
    let config = StudyConfig::new().with_n_users(200).with_seed(1);
    let analysis = RetentionAnalysis::run(&config).unwrap();

    assert!(matches!(
        export::write_users_csv(&analysis.users, paths.users_csv()),
        Err(SurvivalError::Io(_))
    ));
    assert!(plot::write_all(&analysis, &paths).is_err());
    assert!(report::write_summary("x", paths.summary_text()).is_err());
}

#[test]
fn test_same_seed_same_cohort() {
    let config = StudyConfig::new().with_n_users(250).with_seed(99);
    let a = generate_users(&config).unwrap();
    let b = generate_users(&config).unwrap();
    assert_eq!(a, b);

    let c = generate_users(&config.clone().with_seed(100)).unwrap();
    assert_ne!(a, c);
}

#[test]
fn test_invalid_config_rejected() {
    let config = StudyConfig::new().with_n_users(0);
    assert!(generate_users(&config).is_err());
    assert!(RetentionAnalysis::run(&config).is_err());
}
