#![recursion_limit = "256"]

use std::process::ExitCode;

use cifar10::{cli::Cli, logger::install_file_logger, ExperimentConfig, ExperimentReport};
use clap::Parser;

#[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
mod ndarray {
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };
    use cifar10::{run_cifar10, ExperimentConfig, ExperimentReport, Result};

    pub fn run(config: &ExperimentConfig) -> Result<ExperimentReport> {
        let device = NdArrayDevice::Cpu;
        run_cifar10::<Autodiff<NdArray>>(config, &device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };
    use cifar10::{run_cifar10, ExperimentConfig, ExperimentReport, Result};

    pub fn run(config: &ExperimentConfig) -> Result<ExperimentReport> {
        let device = LibTorchDevice::Cpu;
        run_cifar10::<Autodiff<LibTorch>>(config, &device)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };
    use cifar10::{run_cifar10, ExperimentConfig, ExperimentReport, Result};

    pub fn run(config: &ExperimentConfig) -> Result<ExperimentReport> {
        let device = WgpuDevice::default();
        run_cifar10::<Autodiff<Wgpu>>(config, &device)
    }
}

#[cfg(not(any(
    feature = "ndarray",
    feature = "ndarray-blas-openblas",
    feature = "tch-cpu",
    feature = "wgpu",
)))]
compile_error!("Enable one of the `ndarray`, `ndarray-blas-openblas`, `tch-cpu` or `wgpu` features.");

/// Backend [run] dispatches to, in the same order.
#[allow(unreachable_code)]
fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu")]
    return "wgpu";

    #[cfg(feature = "tch-cpu")]
    return "tch-cpu";

    #[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
    return "ndarray";

    unreachable!("At least one backend will be selected.")
}

#[allow(unreachable_code)]
fn run(config: &ExperimentConfig) -> cifar10::Result<ExperimentReport> {
    #[cfg(feature = "wgpu")]
    return wgpu::run(config);

    #[cfg(feature = "tch-cpu")]
    return tch_cpu::run(config);

    #[cfg(any(feature = "ndarray", feature = "ndarray-blas-openblas"))]
    return ndarray::run(config);

    unreachable!("At least one backend will be selected.")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = install_file_logger(&cli.log_file) {
        eprintln!("Could not set up logging: {err}");
    }

    let result = cli.into_config().and_then(|config| {
        log::info!("Running experiment on {} with {config}", backend_name());
        run(&config)
    });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Experiment failed: {err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
