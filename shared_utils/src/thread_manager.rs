//! Thread budget for parallel encodes
//!
//! Treats CPU cores as a fixed budget split between parallel files (width)
//! and ffmpeg threads per file (depth):
//! `parallel_tasks * child_threads <= available_cores`.

/// Thread allocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAllocation {
    /// Files processed at once (rayon pool size)
    pub parallel_tasks: usize,
    /// Threads left for each ffmpeg child
    pub child_threads: usize,
}

/// Video workload split for the current machine.
pub fn video_thread_config() -> ThreadAllocation {
    video_thread_config_for(num_cpus::get())
}

/// Video encodes scale well with threads, so width stays at 1, or 2 when
/// at least 8 cores remain after the OS reserve.
pub fn video_thread_config_for(total_cores: usize) -> ThreadAllocation {
    // 20% of cores, between 1 and 2
    let reserved = ((total_cores as f64 * 0.2).ceil() as usize).clamp(1, 2);
    let available_cores = total_cores.saturating_sub(reserved).max(1);

    let parallel_tasks = if available_cores >= 8 { 2 } else { 1 };
    let child_threads = (available_cores / parallel_tasks).max(1);

    ThreadAllocation {
        parallel_tasks,
        child_threads,
    }
}

/// Explicit `--jobs` wins; zero or absent falls back to the video budget.
pub fn resolve_parallel_tasks(requested: Option<usize>) -> usize {
    match requested {
        Some(n) if n > 0 => n,
        _ => video_thread_config().parallel_tasks,
    }
}
