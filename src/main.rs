//! MobileNetV2 Classifier CLI
//!
//! Entry point for training, summarizing, evaluating and running the
//! MobileNetV2 classifier with the Burn framework.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use walkdir::WalkDir;

use mobilenetv2_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use mobilenetv2_classifier::dataset::{is_image_file, ImageFolder, ImageFolderDataset};
use mobilenetv2_classifier::inference::{evaluate, Predictor};
use mobilenetv2_classifier::model::{MobileNetV2Config, ModelSummary};
use mobilenetv2_classifier::training::{fit, TrainingConfig};
use mobilenetv2_classifier::utils::format_duration;
use mobilenetv2_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

/// MobileNetV2 image classification
///
/// Trains a MobileNetV2 network on a directory-of-classes dataset and runs
/// the saved checkpoints on new images.
#[derive(Parser, Debug)]
#[command(name = "mobilenetv2")]
#[command(version)]
#[command(about = "MobileNetV2 image classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long)]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a fresh network, keeping the weights of the best epoch
    Train {
        /// TOML configuration file (every field is optional)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Training images, one sub-directory per class
        #[arg(long)]
        train_dir: Option<PathBuf>,

        /// Validation images, one sub-directory per class
        #[arg(long)]
        test_dir: Option<PathBuf>,

        /// Directory for saved weights
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training and validation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Base learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Width multiplier
        #[arg(short, long)]
        multiplier: Option<f64>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Hide the per-step progress bar
        #[arg(long, default_value = "false")]
        no_progress: bool,
    },

    /// Print the layer table of a network
    Summary {
        /// Width multiplier
        #[arg(short, long, default_value = "1.0")]
        multiplier: f64,

        /// Number of output classes
        #[arg(short, long, default_value = "2")]
        num_classes: usize,

        /// Input image size (square)
        #[arg(long, default_value = "224")]
        image_size: usize,
    },

    /// Evaluate a checkpoint on a directory-of-classes dataset
    Evaluate {
        /// Weights file written during training
        #[arg(short, long)]
        weights: PathBuf,

        /// Dataset directory, one sub-directory per class
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Batch size for inference
        #[arg(short, long, default_value = "32")]
        batch_size: usize,
    },

    /// Classify an image, or every image below a directory
    Predict {
        /// Weights file written during training
        #[arg(short, long)]
        weights: PathBuf,

        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Train {
            config,
            train_dir,
            test_dir,
            save_dir,
            epochs,
            batch_size,
            learning_rate,
            multiplier,
            seed,
            no_progress,
        } => {
            let mut training = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?,
                None => TrainingConfig::default(),
            };

            // CLI flags take precedence over the file
            if let Some(v) = train_dir {
                training.train_dir = v;
            }
            if let Some(v) = test_dir {
                training.test_dir = v;
            }
            if let Some(v) = save_dir {
                training.save_dir = v;
            }
            if let Some(v) = epochs {
                training.epochs = v;
            }
            if let Some(v) = batch_size {
                training.batch_size = v;
            }
            if let Some(v) = learning_rate {
                training.learning_rate = v;
            }
            if let Some(v) = multiplier {
                training.multiplier = v;
            }
            if let Some(v) = seed {
                training.seed = v;
            }

            run_train(&training, !no_progress)
        }
        Commands::Summary {
            multiplier,
            num_classes,
            image_size,
        } => run_summary(
            MobileNetV2Config::new()
                .with_multiplier(multiplier)
                .with_num_classes(num_classes)
                .with_input_size(image_size),
        ),
        Commands::Evaluate {
            weights,
            data_dir,
            batch_size,
        } => run_evaluate(&weights, &data_dir, batch_size),
        Commands::Predict { weights, input } => run_predict(&weights, &input),
    }
}

fn run_train(config: &TrainingConfig, progress: bool) -> Result<()> {
    println!("{}", "Initializing Training...".green().bold());
    config.validate().context("Invalid training configuration")?;

    let device = default_device();
    let model_config = config.model_config();
    let model = model_config.init::<DefaultBackend>(&device)?;
    println!("{}", ModelSummary::of(&model, &model_config));
    drop(model);

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🧠 Backend:           {}", backend_name());
    println!("  📁 Train dir:         {}", config.train_dir.display());
    println!("  📁 Test dir:          {}", config.test_dir.display());
    println!("  💾 Save dir:          {}", config.save_dir.display());
    println!("  🔄 Epochs:            {}", config.epochs);
    println!("  📦 Batch size:        {}", config.batch_size);
    println!("  🪜 Steps per epoch:   {}", config.steps_per_epoch());
    println!("  ✅ Validation steps:  {}", config.validation_steps());
    println!("  📈 Learning rate:     {} (decay {})", config.learning_rate, config.decay);
    println!("  📉 Schedule:          {}", config.schedule.description());
    println!();

    let start = Instant::now();
    let history = fit::<TrainingBackend>(config, &device, progress)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  ⏱️  Duration: {}", format_duration(start.elapsed().as_secs_f64()));
    if let Some(best) = history.best_epoch() {
        println!(
            "  🎉 Best val_acc: {:.4} (epoch {})",
            best.val_accuracy,
            best.epoch + 1
        );
    }
    match &history.best_checkpoint {
        Some(path) => {
            println!("  💾 Best weights: {}", path.display());
            println!();
            println!("{}", "Next steps:".cyan().bold());
            println!(
                "  • Evaluate: mobilenetv2 evaluate --weights {} --data-dir {}",
                path.display(),
                config.test_dir.display()
            );
            println!(
                "  • Predict:  mobilenetv2 predict --weights {} --input <image>",
                path.display()
            );
        }
        None => println!("  {} No epoch produced a finite val_acc, nothing saved", "Warning:".yellow()),
    }

    Ok(())
}

fn run_summary(config: MobileNetV2Config) -> Result<()> {
    let model = config.init::<DefaultBackend>(&default_device())?;
    println!("{}", ModelSummary::of(&model, &config));
    Ok(())
}

fn run_evaluate(weights: &Path, data_dir: &Path, batch_size: usize) -> Result<()> {
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load(weights, &device)?;

    let folder = ImageFolder::new(data_dir)?;
    folder.stats().print();

    let dataset = ImageFolderDataset::new(folder, predictor.image_size());
    let matrix = evaluate(&predictor.model, &dataset, batch_size, &device)?;

    println!();
    println!("{}", "Evaluation Results:".cyan().bold());
    println!("{}", matrix);
    Ok(())
}

fn run_predict(weights: &Path, input: &Path) -> Result<()> {
    let predictor = Predictor::<DefaultBackend>::load(weights, &default_device())?;

    let images: Vec<PathBuf> = if input.is_dir() {
        WalkDir::new(input)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
            .map(|e| e.into_path())
            .collect()
    } else {
        vec![input.to_path_buf()]
    };
    info!("Classifying {} image(s)", images.len());

    for path in images {
        let prediction = predictor
            .predict_path(&path)
            .with_context(|| format!("Failed to classify {}", path.display()))?;
        println!("{}", prediction.display(predictor.class_names()));
    }

    Ok(())
}
