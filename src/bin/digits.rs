//! MNIST digit recognition shell.
//!
//! Loads a run configuration, reads the MNIST IDX files, then trains and/or
//! evaluates the configured network, reporting per-epoch correct counts.
//! Dataset decoding lives here; the engine only ever sees `Sample`s.

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use digit_recognizer::cnn::{Cnn, CnnConfig};
use digit_recognizer::config::{load_run_config, RunConfig};
use digit_recognizer::dataset::{Sample, IMG_LEN, IMG_SIDE};
use digit_recognizer::error::Result;
use digit_recognizer::ffnn::Ffnn;
use digit_recognizer::model::{CnnModel, FfnnModel};
use digit_recognizer::utils::{Activation, SimpleRng};

// Read a big-endian u32 and advance the byte offset (IDX format uses BE).
fn read_be_u32(data: &[u8], offset: &mut usize) -> u32 {
    let b0 = (data[*offset] as u32) << 24;
    let b1 = (data[*offset + 1] as u32) << 16;
    let b2 = (data[*offset + 2] as u32) << 8;
    let b3 = data[*offset + 3] as u32;
    *offset += 4;
    b0 | b1 | b2 | b3
}

// Read IDX images as raw bytes, [N * 784] in row-major order.
fn read_mnist_images(filename: &str, limit: Option<usize>) -> Vec<u8> {
    let data = fs::read(filename).unwrap_or_else(|_| {
        eprintln!("Could not open file {}", filename);
        process::exit(1);
    });

    let mut offset = 0usize;
    // IDX header: magic, count, rows, cols.
    let _magic = read_be_u32(&data, &mut offset);
    let total_images = read_be_u32(&data, &mut offset) as usize;
    let rows = read_be_u32(&data, &mut offset) as usize;
    let cols = read_be_u32(&data, &mut offset) as usize;

    if rows != IMG_SIDE || cols != IMG_SIDE {
        eprintln!("Unexpected MNIST image shape: {}x{}", rows, cols);
        process::exit(1);
    }

    let count = limit.map_or(total_images, |n| n.min(total_images));
    let total_bytes = count * IMG_LEN;

    if data.len() < offset + total_bytes {
        eprintln!("MNIST image file is truncated");
        process::exit(1);
    }

    data[offset..offset + total_bytes].to_vec()
}

// Read IDX labels (0-9).
fn read_mnist_labels(filename: &str, limit: Option<usize>) -> Vec<u8> {
    let data = fs::read(filename).unwrap_or_else(|_| {
        eprintln!("Could not open file {}", filename);
        process::exit(1);
    });

    let mut offset = 0usize;
    let _magic = read_be_u32(&data, &mut offset);
    let total_labels = read_be_u32(&data, &mut offset) as usize;
    let count = limit.map_or(total_labels, |n| n.min(total_labels));

    if data.len() < offset + count {
        eprintln!("MNIST label file is truncated");
        process::exit(1);
    }

    data[offset..offset + count].to_vec()
}

fn build_samples(network: &str, images: &[u8], labels: &[u8]) -> Result<Vec<Sample>> {
    let mut samples = Vec::with_capacity(labels.len());
    for (i, &label) in labels.iter().enumerate() {
        let pixels = &images[i * IMG_LEN..(i + 1) * IMG_LEN];
        let sample = if network == "cnn" {
            Sample::for_cnn(pixels, label)?
        } else {
            Sample::for_ffnn(pixels, label)?
        };
        samples.push(sample);
    }
    Ok(samples)
}

fn load_splits(config: &RunConfig) -> Result<(Vec<Sample>, Vec<Sample>)> {
    let dir = &config.data_dir;
    let mut train = Vec::new();
    let mut test = Vec::new();

    if config.train {
        let images = read_mnist_images(
            &format!("{}/train-images.idx3-ubyte", dir),
            config.train_limit,
        );
        let labels = read_mnist_labels(
            &format!("{}/train-labels.idx1-ubyte", dir),
            config.train_limit,
        );
        train = build_samples(&config.network, &images, &labels)?;
    }
    if config.evaluate {
        let images =
            read_mnist_images(&format!("{}/t10k-images.idx3-ubyte", dir), config.test_limit);
        let labels =
            read_mnist_labels(&format!("{}/t10k-labels.idx1-ubyte", dir), config.test_limit);
        test = build_samples(&config.network, &images, &labels)?;
    }

    Ok((train, test))
}

fn save_model(config: &RunConfig, write: impl FnOnce() -> Result<()>) -> Result<()> {
    if let Some(parent) = Path::new(&config.model_path).parent() {
        fs::create_dir_all(parent).ok();
    }
    write()?;
    println!("Saved model to {}", config.model_path);
    Ok(())
}

fn report_epochs(scores: &[usize], total: usize) {
    for (epoch, correct) in scores.iter().enumerate() {
        println!("Epoch {}: {}/{}", epoch + 1, correct, total);
    }
}

fn run_ffnn(
    config: &RunConfig,
    mut train: Vec<Sample>,
    mut test: Vec<Sample>,
    rng: &mut SimpleRng,
) -> Result<()> {
    let mut network = if config.fresh {
        Ffnn::new(&config.ffnn_sizes, Activation::Sigmoid, rng)?
    } else {
        Ffnn::from_model(&FfnnModel::load(&config.model_path)?)?
    };

    if config.standardize {
        if network.normalization().is_none() {
            network.fit_normalization(&train)?;
        }
        // Stats travel with the model; inputs are standardized up front.
        if let Some(stats) = network.normalization().cloned() {
            for sample in train.iter_mut().chain(test.iter_mut()) {
                stats.apply(&mut sample.input)?;
            }
        }
    }

    if config.train {
        let hp = &config.hyperparameters;
        println!(
            "Training FFNN {:?}: epochs={} batch={} lr={} l2={}",
            network.layer_sizes(),
            hp.epochs,
            hp.mini_batch_size,
            hp.learning_rate,
            hp.l2
        );
        let test_set = if config.evaluate { Some(&test[..]) } else { None };
        let scores = network.stochastic_gradient_descent(&train, hp, test_set, rng)?;
        report_epochs(&scores, test.len());
        save_model(config, || network.to_model().save(&config.model_path))?;
    } else {
        let correct = network.accuracy(&test)?;
        println!("Accuracy: {}/{}", correct, test.len());
    }

    Ok(())
}

fn run_cnn(
    config: &RunConfig,
    train: Vec<Sample>,
    test: Vec<Sample>,
    rng: &mut SimpleRng,
) -> Result<()> {
    let mut network = if config.fresh {
        Cnn::new(CnnConfig::default(), rng)?
    } else {
        Cnn::from_model(&CnnModel::load(&config.model_path)?)?
    };

    if config.train {
        let hp = &config.hyperparameters;
        println!(
            "Training CNN: epochs={} lr={}",
            hp.epochs, hp.learning_rate
        );
        let test_set = if config.evaluate { Some(&test[..]) } else { None };
        let scores = network.train(&train, hp.epochs, hp.learning_rate, test_set, rng)?;
        report_epochs(&scores, test.len());
        save_model(config, || network.to_model().save(&config.model_path))?;
    } else {
        let correct = network.test(&test)?;
        println!("Accuracy: {}/{}", correct, test.len());
    }

    Ok(())
}

fn run(config: &RunConfig) -> Result<()> {
    println!("Loading MNIST from {}...", config.data_dir);
    let (train, test) = load_splits(config)?;
    println!("Train: {} | Test: {}", train.len(), test.len());

    let mut rng = SimpleRng::new(config.seed);
    if config.seed == 0 {
        rng.reseed_from_time();
    }

    match config.network.as_str() {
        "cnn" => run_cnn(config, train, test, &mut rng),
        _ => run_ffnn(config, train, test, &mut rng),
    }
}

fn main() {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/run.json".to_string());

    let config = load_run_config(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config {}: {}", config_path, e);
        process::exit(1);
    });

    if let Err(e) = run(&config) {
        eprintln!("Run failed: {}", e);
        process::exit(1);
    }
}
