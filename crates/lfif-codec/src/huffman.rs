//! 规范 Huffman 编解码.
//!
//! 每个文件四张表: {DC, AC} × {亮度, 色度}, 色度表由通道 1、2 共用.
//! 一个游程对的符号为字节 `(zeroes << class_bits) | class`, 符号码字之后
//! 追加幅度位: `class` 位, 高位在前, 负值全位取反 (JPEG 反码约定).
//!
//! 码长构造采用 ITU T.81 附录 K.2 流程: 频次合并时加入一个保留符号,
//! 超过 16 位的码长向上调整, 最后按 (码长升序, 符号升序) 规范赋码.
//! 表序列化为 16 字节的逐码长计数向量加规范顺序的符号表.

use std::io::{Read, Write};

use lfif_core::bitstream::{IBitstream, OBitstream};
use lfif_core::runlength::RunLengthPair;
use lfif_core::{LfifError, LfifResult};

/// 最大码长
pub const MAX_CODE_LENGTH: usize = 16;

/// 符号权重统计
///
/// 256 个真实符号之外多出一个保留符号槽, 合并时保证不产生全 1 码字.
pub struct HuffmanWeights {
    counts: Box<[u64; 257]>,
}

impl HuffmanWeights {
    /// 创建空的权重统计
    pub fn new() -> Self {
        Self {
            counts: Box::new([0; 257]),
        }
    }

    /// 累计一个符号
    pub fn tally(&mut self, symbol: u8) {
        self.counts[symbol as usize] += 1;
    }
}

impl Default for HuffmanWeights {
    fn default() -> Self {
        Self::new()
    }
}

/// 编码侧 Huffman 表 (规范码)
pub struct HuffmanTable {
    /// 逐符号码长 (0 表示符号不在表中)
    lengths: [u8; 256],
    /// 逐符号码字
    codes: [u16; 256],
    /// 逐码长符号计数 (码长 1..=16)
    counts: [u8; MAX_CODE_LENGTH],
    /// 规范顺序的符号表
    symbols: Vec<u8>,
}

impl HuffmanTable {
    /// 由权重生成限长规范码
    pub fn from_weights(weights: &HuffmanWeights) -> Self {
        // T.81 K.2: 保留符号参与合并, 频次并列时取较大符号
        let mut freq = *weights.counts;
        freq[256] = 1;

        let mut codesize = [0u32; 257];
        let mut others = [-1i32; 257];

        loop {
            let v1 = match smallest_nonzero(&freq, usize::MAX) {
                Some(v) => v,
                None => break,
            };
            let v2 = match smallest_nonzero(&freq, v1) {
                Some(v) => v,
                None => break,
            };

            freq[v1] += freq[v2];
            freq[v2] = 0;

            codesize[v1] += 1;
            let mut chain = v1;
            while others[chain] >= 0 {
                chain = others[chain] as usize;
                codesize[chain] += 1;
            }
            others[chain] = v2 as i32;

            codesize[v2] += 1;
            let mut chain = v2;
            while others[chain] >= 0 {
                chain = others[chain] as usize;
                codesize[chain] += 1;
            }
        }

        // 逐码长计数 (合并树深度最大 256)
        let mut bits = vec![0u32; 258];
        for &size in codesize.iter() {
            if size > 0 {
                bits[size as usize] += 1;
            }
        }

        // 限长调整: 最长码缩短, 代价是较短码加长 (T.81 附录 K.2)
        for i in (MAX_CODE_LENGTH + 1..bits.len()).rev() {
            while bits[i] > 0 {
                let mut j = i - 2;
                while bits[j] == 0 {
                    j -= 1;
                }
                bits[i] -= 2;
                bits[i - 1] += 1;
                bits[j + 1] += 2;
                bits[j] -= 1;
            }
        }

        // 去除保留符号 (必然位于最长码长)
        for i in (1..=MAX_CODE_LENGTH).rev() {
            if bits[i] > 0 {
                bits[i] -= 1;
                break;
            }
        }

        // 符号按 (原始码长升序, 符号升序) 排列
        let mut symbols = Vec::new();
        for size in 1..258 {
            for symbol in 0..256usize {
                if codesize[symbol] == size {
                    symbols.push(symbol as u8);
                }
            }
        }

        let mut counts = [0u8; MAX_CODE_LENGTH];
        for (len, &count) in bits.iter().enumerate().take(MAX_CODE_LENGTH + 1).skip(1) {
            counts[len - 1] = count as u8;
        }

        // 规范赋码: 首码为 0, 同码长连续, 换码长时左移
        let mut lengths = [0u8; 256];
        let mut codes = [0u16; 256];
        let mut code = 0u16;
        let mut next = 0usize;
        for len in 1..=MAX_CODE_LENGTH {
            for _ in 0..counts[len - 1] {
                let symbol = symbols[next] as usize;
                lengths[symbol] = len as u8;
                codes[symbol] = code;
                code = code.wrapping_add(1);
                next += 1;
            }
            code <<= 1;
        }

        Self {
            lengths,
            codes,
            counts,
            symbols,
        }
    }

    /// 符号的码长 (0 表示不在表中)
    pub fn length_of(&self, symbol: u8) -> u8 {
        self.lengths[symbol as usize]
    }

    /// 序列化: 16 字节逐码长计数 + 规范顺序符号表
    pub fn write_to<W: Write>(&self, output: &mut W) -> LfifResult<()> {
        output.write_all(&self.counts)?;
        output.write_all(&self.symbols)?;
        Ok(())
    }

    /// 写出一个符号的码字
    pub fn encode_symbol<W: Write>(
        &self,
        symbol: u8,
        bitstream: &mut OBitstream<W>,
    ) -> LfifResult<()> {
        let len = self.lengths[symbol as usize];
        debug_assert!(len > 0, "符号 0x{:02X} 不在表中", symbol);
        bitstream.put_bits(u64::from(self.codes[symbol as usize]), u32::from(len))
    }
}

/// 在 `freq` 中寻找最小非零频次的符号, 并列取较大符号, 跳过 `exclude`
fn smallest_nonzero(freq: &[u64; 257], exclude: usize) -> Option<usize> {
    let mut best = None;
    let mut best_freq = u64::MAX;
    for (v, &f) in freq.iter().enumerate() {
        if v != exclude && f > 0 && f <= best_freq {
            best_freq = f;
            best = Some(v);
        }
    }
    best
}

/// 解码侧 Huffman 表
pub struct HuffmanDecoder {
    /// 逐码长符号计数
    counts: [u8; MAX_CODE_LENGTH],
    /// 规范顺序的符号表
    symbols: Vec<u8>,
    /// 各码长的首码字
    first_code: [u32; MAX_CODE_LENGTH + 1],
    /// 各码长在符号表中的起始下标
    first_index: [usize; MAX_CODE_LENGTH + 1],
}

impl HuffmanDecoder {
    /// 从序列化形式读入
    pub fn read_from<R: Read>(input: &mut R) -> LfifResult<Self> {
        let mut counts = [0u8; MAX_CODE_LENGTH];
        input.read_exact(&mut counts)?;

        let total: usize = counts.iter().map(|&c| c as usize).sum();
        let mut symbols = vec![0u8; total];
        input.read_exact(&mut symbols)?;

        let mut first_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut first_index = [0usize; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        let mut index = 0usize;
        for len in 1..=MAX_CODE_LENGTH {
            first_code[len] = code;
            first_index[len] = index;
            code = (code + u32::from(counts[len - 1])) << 1;
            index += counts[len - 1] as usize;
        }

        Ok(Self {
            counts,
            symbols,
            first_code,
            first_index,
        })
    }

    /// 逐位读取并解出一个符号
    pub fn decode_symbol<R: Read>(&self, bitstream: &mut IBitstream<R>) -> LfifResult<u8> {
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            code = (code << 1) | bitstream.get_bit()?;
            let offset = code.wrapping_sub(self.first_code[len]);
            if offset < u32::from(self.counts[len - 1]) {
                return Ok(self.symbols[self.first_index[len] + offset as usize]);
            }
        }
        Err(LfifError::InvalidData("Huffman 码字超出表范围".into()))
    }

    /// 解出的 (符号 → 码长) 映射, 用于校验规范性
    pub fn lengths(&self) -> [u8; 256] {
        let mut lengths = [0u8; 256];
        let mut index = 0usize;
        for len in 1..=MAX_CODE_LENGTH {
            for _ in 0..self.counts[len - 1] {
                lengths[self.symbols[index] as usize] = len as u8;
                index += 1;
            }
        }
        lengths
    }
}

/// 写出一个游程对: 符号码字 + 幅度位 (负值反码)
pub fn encode_pair<W: Write>(
    pair: &RunLengthPair,
    table: &HuffmanTable,
    class_bits: u32,
    bitstream: &mut OBitstream<W>,
) -> LfifResult<()> {
    table.encode_symbol(pair.symbol(class_bits), bitstream)?;

    let class = pair.class();
    if class > 0 {
        let magnitude = pair.amplitude.unsigned_abs();
        let mask = (1u64 << class) - 1;
        let bits = if pair.amplitude < 0 {
            !magnitude & mask
        } else {
            magnitude
        };
        bitstream.put_bits(bits, class)?;
    }
    Ok(())
}

/// 读入一个游程对, 幅度按 JPEG EXTEND 规则还原
pub fn decode_pair<R: Read>(
    decoder: &HuffmanDecoder,
    class_bits: u32,
    bitstream: &mut IBitstream<R>,
) -> LfifResult<RunLengthPair> {
    let symbol = decoder.decode_symbol(bitstream)?;
    let (zeroes, class) = RunLengthPair::split_symbol(symbol, class_bits);

    let amplitude = if class == 0 {
        0
    } else {
        let bits = bitstream.get_bits(class)? as i64;
        if bits < 1 << (class - 1) {
            bits - (1 << class) + 1
        } else {
            bits
        }
    };

    Ok(RunLengthPair { zeroes, amplitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed_weights() -> HuffmanWeights {
        let mut weights = HuffmanWeights::new();
        for symbol in 0u16..40 {
            for _ in 0..(1000 >> (symbol / 4)).max(1) {
                weights.tally(symbol as u8);
            }
        }
        weights
    }

    #[test]
    fn test_codes_are_prefix_free() {
        let table = HuffmanTable::from_weights(&skewed_weights());

        let coded: Vec<(u16, u8)> = (0..256)
            .filter(|&s| table.lengths[s] > 0)
            .map(|s| (table.codes[s], table.lengths[s]))
            .collect();
        assert!(!coded.is_empty());

        for (i, &(code_a, len_a)) in coded.iter().enumerate() {
            for &(code_b, len_b) in coded.iter().skip(i + 1) {
                let min_len = len_a.min(len_b);
                let prefix_a = code_a >> (len_a - min_len);
                let prefix_b = code_b >> (len_b - min_len);
                assert!(
                    prefix_a != prefix_b,
                    "码字 {:b}/{} 与 {:b}/{} 存在前缀关系",
                    code_a,
                    len_a,
                    code_b,
                    len_b,
                );
            }
        }
    }

    #[test]
    fn test_lengths_within_limit() {
        // 大量接近的权重迫使树变深, 限长过程必须收敛到 16
        let mut weights = HuffmanWeights::new();
        for symbol in 0u16..256 {
            let f = 1u64 << (symbol / 16).min(40);
            for _ in 0..f.min(10_000) {
                weights.tally(symbol as u8);
            }
        }
        let table = HuffmanTable::from_weights(&weights);
        for s in 0..256 {
            assert!(table.lengths[s] as usize <= MAX_CODE_LENGTH);
        }
    }

    #[test]
    fn test_serialized_table_reproduces_lengths() {
        let table = HuffmanTable::from_weights(&skewed_weights());

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let decoder = HuffmanDecoder::read_from(&mut &buf[..]).unwrap();

        assert_eq!(decoder.lengths(), table.lengths, "解码侧码长映射应与编码侧一致");
    }

    #[test]
    fn test_symbol_roundtrip() {
        let table = HuffmanTable::from_weights(&skewed_weights());
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let decoder = HuffmanDecoder::read_from(&mut &buf[..]).unwrap();

        let present: Vec<u8> = (0..=255u8).filter(|&s| table.lengths[s as usize] > 0).collect();

        let mut payload = Vec::new();
        let mut bs = OBitstream::new(&mut payload);
        for &s in &present {
            table.encode_symbol(s, &mut bs).unwrap();
        }
        bs.flush().unwrap();

        let mut bs = IBitstream::new(&payload[..]);
        for &s in &present {
            assert_eq!(decoder.decode_symbol(&mut bs).unwrap(), s);
        }
    }

    #[test]
    fn test_single_symbol_alphabet() {
        let mut weights = HuffmanWeights::new();
        weights.tally(0x42);
        let table = HuffmanTable::from_weights(&weights);
        assert_eq!(table.lengths[0x42], 1, "唯一符号应得到 1 位码");

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let decoder = HuffmanDecoder::read_from(&mut &buf[..]).unwrap();

        let mut payload = Vec::new();
        let mut bs = OBitstream::new(&mut payload);
        table.encode_symbol(0x42, &mut bs).unwrap();
        bs.flush().unwrap();

        let mut bs = IBitstream::new(&payload[..]);
        assert_eq!(decoder.decode_symbol(&mut bs).unwrap(), 0x42);
    }

    #[test]
    fn test_pair_roundtrip_with_amplitudes() {
        let class_bits = 4;
        let pairs = vec![
            RunLengthPair { zeroes: 0, amplitude: 0 },
            RunLengthPair { zeroes: 0, amplitude: 1 },
            RunLengthPair { zeroes: 3, amplitude: -1 },
            RunLengthPair { zeroes: 15, amplitude: 0 },
            RunLengthPair { zeroes: 2, amplitude: 255 },
            RunLengthPair { zeroes: 0, amplitude: -256 },
            RunLengthPair { zeroes: 7, amplitude: -2047 },
            RunLengthPair { zeroes: 1, amplitude: 2047 },
        ];

        let mut weights = HuffmanWeights::new();
        for p in &pairs {
            weights.tally(p.symbol(class_bits));
        }
        let table = HuffmanTable::from_weights(&weights);
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let decoder = HuffmanDecoder::read_from(&mut &buf[..]).unwrap();

        let mut payload = Vec::new();
        let mut bs = OBitstream::new(&mut payload);
        for p in &pairs {
            encode_pair(p, &table, class_bits, &mut bs).unwrap();
        }
        bs.flush().unwrap();

        let mut bs = IBitstream::new(&payload[..]);
        for p in &pairs {
            let decoded = decode_pair(&decoder, class_bits, &mut bs).unwrap();
            assert_eq!(&decoded, p, "游程对往返不一致");
        }
    }
}
