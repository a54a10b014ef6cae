//! Example: describe two images with the CLIP encoder and compare them

use anyhow::{Context, Result};
use imagedupe::{init, load_extractor, normalize, Config, Preprocessor};

#[tokio::main]
async fn main() -> Result<()> {
    init()?;

    let mut args = std::env::args().skip(1);
    let first = args.next().context("usage: find_similar <image> <image>")?;
    let second = args.next().context("usage: find_similar <image> <image>")?;

    let config = Config::from_env()?;
    let preprocessor = Preprocessor::new(&config.preprocess);
    let extractor = load_extractor(&config).await?;

    let a = normalize(extractor.extract(&preprocessor.prepare_path(&first)?)?);
    let b = normalize(extractor.extract(&preprocessor.prepare_path(&second)?)?);
    extractor.close();

    let similarity = imagedupe::compare(&a, &b)?;
    println!("Similarity between images: {:.2}%", similarity * 100.0);

    Ok(())
}
