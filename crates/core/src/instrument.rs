//! Mapping between venue instrument ids and unified symbols.
//!
//! Perpetual swaps are `BASE-QUOTE-SWAP` on the venue and `BASE/QUOTE:SETTLE`
//! in strategy records. Only linear swaps settled in the quote currency are
//! supported, which keeps the mapping a bijection.

const SWAP_SUFFIX: &str = "-SWAP";

/// `BTC-USDT-SWAP` -> `BTC/USDT:USDT`.
#[must_use]
pub fn inst_id_to_symbol(inst_id: &str) -> Option<String> {
    let pair = inst_id.strip_suffix(SWAP_SUFFIX)?;
    let (base, quote) = pair.split_once('-')?;
    if !is_code(base) || !is_code(quote) {
        return None;
    }
    Some(format!("{base}/{quote}:{quote}"))
}

/// `BTC/USDT:USDT` -> `BTC-USDT-SWAP`.
#[must_use]
pub fn symbol_to_inst_id(symbol: &str) -> Option<String> {
    let (pair, settle) = symbol.split_once(':')?;
    let (base, quote) = pair.split_once('/')?;
    if !is_code(base) || !is_code(quote) || settle != quote {
        return None;
    }
    Some(format!("{base}-{quote}{SWAP_SUFFIX}"))
}

fn is_code(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
}
