use anyhow::bail;

/// Print `data` as 16-byte rows labelled with their absolute device offset.
pub fn hex(base: u64, data: &[u8]) {
    for (i, row) in data.chunks(16).enumerate() {
        println!("{}", row_line(base + (i * 16) as u64, row));
    }
}

fn row_line(addr: u64, row: &[u8]) -> String {
    let mut line = format!("{:010x}  ", addr);
    for (i, b) in row.iter().enumerate() {
        if i == 8 {
            line.push(' ');
        }
        line.push_str(&format!("{:02x} ", b));
    }
    for i in row.len()..16 {
        if i == 8 {
            line.push(' ');
        }
        line.push_str("   ");
    }
    line.push(' ');
    line.extend(row.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' }));
    line
}

/// Accepts "deadbeef", "de ad be ef" or "0xdeadbeef".
pub fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = s
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in {:?}", s);
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for i in (0..digits.len()).step_by(2) {
        match u8::from_str_radix(&digits[i..i + 2], 16) {
            Ok(b) => out.push(b),
            Err(_) => bail!("invalid hex byte {:?}", &digits[i..i + 2]),
        }
    }
    Ok(out)
}
