//! Streaming Demo: simulated model output rendered into a live tree.
//!
//! Tokens arrive every few milliseconds, far faster than the pacing
//! interval. The refresh ticker drives the view at ~60 FPS; a status line
//! shows how many offers were coalesced and what the adaptive interval is
//! doing. The final tree is printed when the stream ends.
//!
//! Set `RUST_LOG=stream_morph=debug` to watch pacing and cache events.

use crossterm::cursor::MoveToColumn;
use crossterm::style::{Print, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{stdout, Write};
use std::time::{Duration, Instant};
use stream_morph::{
    ApplyMode, NodeRef, RefreshTicker, StreamView, TickerConfig, ViewConfig,
};
use tracing_subscriber::EnvFilter;

/// Sample text to stream (simulating a model response).
const SAMPLE_TEXT: &str = r#"# Incremental rendering

Streaming output grows one token at a time. Re-rendering the whole answer on
every token is wasteful: almost everything on screen is already correct.

## What the view does

Each update is **fingerprinted** first. Blocks whose markup did not change
are skipped, so only the paragraph being written is patched.

Inline math such as $e^{i\pi} + 1 = 0$ and display math

$$
\int_0^1 x^2 \, dx = \frac{1}{3}
$$

are cached separately from code:

```rust
fn main() {
    let answer = 42;
    println!("{answer}");
}
```

The update interval adapts to measured patch cost, so a slow frame stretches
the interval instead of stalling the stream.
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let container = NodeRef::element("article");
    // Sentinel standing in for a blinking cursor. Whole-tree patches never
    // remove it and insert new blocks ahead of it.
    container.append_child(
        NodeRef::element("span")
            .with_attr("class", "cursor")
            .ignored(),
    );

    let config = ViewConfig::default().with_apply_mode(ApplyMode::Whole);
    let mut view = StreamView::new(container.clone(), config)?;
    let ticker = RefreshTicker::spawn(TickerConfig::default())?;

    let chars: Vec<char> = SAMPLE_TEXT.chars().collect();
    let token_interval = Duration::from_millis(4);
    let mut index = 0;
    let mut frames = 0u64;
    let mut patches = 0usize;
    let mut last_token = Instant::now();
    let mut out = stdout();

    view.start_session(Instant::now());

    while index < chars.len() {
        let now = Instant::now();
        if now.duration_since(last_token) >= token_interval {
            // Pseudo-random 1-4 character tokens.
            let end = (index + (index * 7) % 4 + 1).min(chars.len());
            let chunk: String = chars[index..end].iter().collect();
            if view.push(&chunk, now)? {
                patches += 1;
            }
            index = end;
            last_token = now;
        }

        if let Some(tick) = ticker.latest() {
            frames += 1;
            patches += view.on_frame(tick.at)?;

            queue!(
                out,
                MoveToColumn(0),
                Clear(ClearType::CurrentLine),
                Print(format!("chars {index:>4}/{} ", chars.len()).dark_grey()),
                Print(format!("frames {frames:>4} ").dark_grey()),
                Print(format!("patches {patches:>3} ").green()),
                Print(format!(
                    "interval {:>3}ms ",
                    view.pacing().current_interval().as_millis()
                )
                .cyan()),
                Print(format!("blocks {:>2}", container.child_count()).yellow()),
            )?;
            out.flush()?;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    let summary = view.end_session(Instant::now())?;
    ticker.join();

    execute!(
        out,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print("Final tree:\n".bold()),
    )?;
    for child in container.children() {
        writeln!(out, "  {}", child.outer_markup())?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "{} applies, {} coalesced offers, mean apply {:?}, final interval {:?}",
        summary.applies, summary.coalesced, summary.mean_apply, summary.final_interval
    )?;
    writeln!(
        out,
        "cache: {} entries, {} bytes",
        summary.cache_entries, summary.cache_bytes
    )?;
    Ok(())
}
