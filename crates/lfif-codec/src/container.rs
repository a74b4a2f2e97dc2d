//! 容器格式: 文件头读写.
//!
//! 头部携带解码所需的全部编解码状态 (量化表、遍历表、Huffman 表),
//! 随后紧跟熵编码负载. 多字节整数一律小端 (刻意偏离原生字节序,
//! 保证可移植); 旧版 v1 容器保留只读兼容, 其图像尺寸为大端.
//!
//! v2 布局:
//!
//! ```text
//! "LFIF-"<D>"D\n"                    ASCII 魔数
//! B₀ "\n" … B_{D-1} "\n" "\n"        块边长, 十进制 ASCII
//! color_depth          1 字节
//! img_dims[0..=D]      (D+1) × u64 小端
//! quant_table[0..2]    各 Bᴰ × {1|2} 字节
//! use_huffman          1 字节
//! use_prediction       1 字节
//! use_shift            1 字节
//! [shift_param[0..2]]  2 × u64 小端 (use_shift 时)
//! [traversal[0..2]]    (use_huffman 时)
//! [huffman[2][2]]      逐码长计数 (16 字节) + 符号 (use_huffman 时)
//! payload              位流
//! ```

use std::io::{Read, Write};

use lfif_core::{geometry, LfifError, LfifResult, QuantTable, TraversalTable};

use crate::huffman::{HuffmanDecoder, HuffmanTable};

/// 解析出的容器元数据
pub struct ContainerMeta {
    /// 各轴块边长
    pub block_shape: Vec<usize>,
    /// 每通道样本位深
    pub color_depth: u8,
    /// 图像尺寸 + 末尾的图像数量轴
    pub img_dims: Vec<u64>,
    /// 熵编码后端: true 为 Huffman, false 为 CABAC
    pub use_huffman: bool,
    /// 是否启用帧内预测 (仅 CABAC)
    pub use_prediction: bool,
    /// 是否启用均值平移
    pub use_shift: bool,
    /// 均值平移参数 [亮度, 色度]
    pub shift_param: [u64; 2],
    /// 量化表 [亮度, 色度]
    pub quant_tables: [QuantTable; 2],
    /// 遍历表 [亮度, 色度] (仅 Huffman)
    pub traversal_tables: Option<[TraversalTable; 2]>,
    /// Huffman 解码表 [通道类][DC/AC] (仅 Huffman)
    pub huffman_decoders: Option<[[HuffmanDecoder; 2]; 2]>,
}

/// 编码端待写入的头部字段
pub struct HeaderSpec<'a> {
    /// 各轴块边长
    pub block_shape: &'a [usize],
    /// 每通道样本位深
    pub color_depth: u8,
    /// 图像尺寸 + 图像数量轴
    pub img_dims: &'a [u64],
    /// 熵编码后端选择
    pub use_huffman: bool,
    /// 是否启用帧内预测
    pub use_prediction: bool,
    /// 是否启用均值平移
    pub use_shift: bool,
    /// 均值平移参数
    pub shift_param: [u64; 2],
    /// 量化表 [亮度, 色度]
    pub quant_tables: &'a [QuantTable; 2],
    /// 遍历表 (仅 Huffman)
    pub traversal_tables: Option<&'a [TraversalTable; 2]>,
    /// Huffman 编码表 [通道类][DC/AC] (仅 Huffman)
    pub huffman_tables: Option<&'a [[HuffmanTable; 2]; 2]>,
}

/// 量化表条目字节宽度: 位深 ≤ 8 时 1 字节, 否则 2 字节
pub fn quant_byte_width(color_depth: u8) -> u8 {
    if color_depth <= 8 {
        1
    } else {
        2
    }
}

/// 写出 v2 文件头
pub fn write_header<W: Write>(output: &mut W, header: &HeaderSpec) -> LfifResult<()> {
    let d = header.block_shape.len();
    debug_assert!((2..=4).contains(&d));

    output.write_all(b"LFIF-")?;
    output.write_all(&[b'0' + d as u8, b'D', b'\n'])?;
    for &side in header.block_shape {
        output.write_all(side.to_string().as_bytes())?;
        output.write_all(b"\n")?;
    }
    output.write_all(b"\n")?;

    output.write_all(&[header.color_depth])?;
    for &dim in header.img_dims {
        output.write_all(&dim.to_le_bytes())?;
    }

    for table in header.quant_tables {
        table.write_to(output)?;
    }

    output.write_all(&[
        header.use_huffman as u8,
        header.use_prediction as u8,
        header.use_shift as u8,
    ])?;

    if header.use_shift {
        for &param in &header.shift_param {
            output.write_all(&param.to_le_bytes())?;
        }
    }

    if header.use_huffman {
        let traversal = header
            .traversal_tables
            .ok_or_else(|| LfifError::InvalidArgument("Huffman 模式缺少遍历表".into()))?;
        for table in traversal {
            table.write_to(output)?;
        }

        let huffman = header
            .huffman_tables
            .ok_or_else(|| LfifError::InvalidArgument("Huffman 模式缺少编码表".into()))?;
        for class_tables in huffman {
            for table in class_tables {
                table.write_to(output)?;
            }
        }
    }

    Ok(())
}

/// 读入文件头 (自动识别 v1/v2)
pub fn read_header<R: Read>(input: &mut R) -> LfifResult<ContainerMeta> {
    let mut prefix = [0u8; 5];
    input.read_exact(&mut prefix)?;
    if &prefix != b"LFIF-" {
        return Err(LfifError::MagicMismatch(format!(
            "非 LFIF 流: {:02X?}",
            prefix,
        )));
    }

    let d_digit = read_u8(input)?;
    if !(b'2'..=b'4').contains(&d_digit) {
        return Err(LfifError::MagicMismatch(format!(
            "不支持的维度标记: {}",
            d_digit as char,
        )));
    }
    let d = (d_digit - b'0') as usize;

    let mut tail = [0u8; 2];
    input.read_exact(&mut tail)?;
    if &tail != b"D\n" {
        return Err(LfifError::MagicMismatch("魔数尾部不匹配".into()));
    }

    // v2 在魔数后跟 ASCII 十进制块边长行; v1 直接跟大端宽度 (高字节为 0)
    let first = read_u8(input)?;
    if first.is_ascii_digit() {
        read_header_v2(input, d, first)
    } else if d == 2 {
        read_header_v1(input, first)
    } else {
        Err(LfifError::MagicMismatch("块边长串不匹配".into()))
    }
}

fn read_header_v2<R: Read>(input: &mut R, d: usize, first: u8) -> LfifResult<ContainerMeta> {
    let mut block_shape = Vec::with_capacity(d);
    let mut carry = Some(first);
    loop {
        let line = read_line(input, carry.take())?;
        if line.is_empty() {
            break;
        }
        let side: usize = std::str::from_utf8(&line)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&s| s >= 1)
            .ok_or_else(|| LfifError::MagicMismatch("块边长串不匹配".into()))?;
        block_shape.push(side);
    }
    if block_shape.len() != d {
        return Err(LfifError::MagicMismatch(format!(
            "块边长数量 {} 与维度 {} 不符",
            block_shape.len(),
            d,
        )));
    }

    let color_depth = read_u8(input)?;
    if color_depth == 0 || color_depth > 16 {
        return Err(LfifError::InvalidData(format!("非法位深: {}", color_depth)));
    }

    let mut img_dims = Vec::with_capacity(d + 1);
    for _ in 0..=d {
        img_dims.push(read_u64_le(input)?);
    }
    if img_dims.iter().any(|&dim| dim == 0) {
        return Err(LfifError::InvalidDimensions(format!("{:?}", img_dims)));
    }

    let byte_width = quant_byte_width(color_depth);
    let quant_tables = [
        QuantTable::read_from(input, &block_shape, byte_width)?,
        QuantTable::read_from(input, &block_shape, byte_width)?,
    ];

    let use_huffman = read_flag(input)?;
    let use_prediction = read_flag(input)?;
    let use_shift = read_flag(input)?;
    if use_huffman && use_prediction {
        return Err(LfifError::InvalidData("预测仅与 CABAC 组合有效".into()));
    }

    let mut shift_param = [0u64; 2];
    if use_shift {
        shift_param[0] = read_u64_le(input)?;
        shift_param[1] = read_u64_le(input)?;
    }

    let (traversal_tables, huffman_decoders) = if use_huffman {
        let size = geometry::block_size(&block_shape);
        let traversal = [
            TraversalTable::read_from(input, size)?,
            TraversalTable::read_from(input, size)?,
        ];
        let huffman = [
            [
                HuffmanDecoder::read_from(input)?,
                HuffmanDecoder::read_from(input)?,
            ],
            [
                HuffmanDecoder::read_from(input)?,
                HuffmanDecoder::read_from(input)?,
            ],
        ];
        (Some(traversal), Some(huffman))
    } else {
        (None, None)
    };

    Ok(ContainerMeta {
        block_shape,
        color_depth,
        img_dims,
        use_huffman,
        use_prediction,
        use_shift,
        shift_param,
        quant_tables,
        traversal_tables,
        huffman_decoders,
    })
}

/// 旧版 v1 容器: 固定 D=2, B=8, 8 位深, Huffman, 尺寸大端,
/// 量化表与遍历表单份共用, 三通道均平移 128
fn read_header_v1<R: Read>(input: &mut R, first: u8) -> LfifResult<ContainerMeta> {
    let mut buf = [0u8; 8];
    buf[0] = first;
    input.read_exact(&mut buf[1..])?;
    let width = u64::from_be_bytes(buf);
    let height = read_u64_be(input)?;
    let image_count = read_u64_be(input)?;
    if width == 0 || height == 0 || image_count == 0 {
        return Err(LfifError::InvalidDimensions(format!(
            "[{}, {}, {}]",
            width, height, image_count,
        )));
    }

    let block_shape = vec![8usize, 8];
    let quant = QuantTable::read_from(input, &block_shape, 1)?;
    let traversal = TraversalTable::read_from(input, 64)?;
    let huffman = [
        [
            HuffmanDecoder::read_from(input)?,
            HuffmanDecoder::read_from(input)?,
        ],
        [
            HuffmanDecoder::read_from(input)?,
            HuffmanDecoder::read_from(input)?,
        ],
    ];

    Ok(ContainerMeta {
        block_shape,
        color_depth: 8,
        img_dims: vec![width, height, image_count],
        use_huffman: true,
        use_prediction: false,
        use_shift: true,
        shift_param: [128, 128],
        quant_tables: [quant.clone(), quant],
        traversal_tables: Some([traversal.clone(), traversal]),
        huffman_decoders: Some(huffman),
    })
}

fn read_u8<R: Read>(input: &mut R) -> LfifResult<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_flag<R: Read>(input: &mut R) -> LfifResult<bool> {
    match read_u8(input)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(LfifError::InvalidData(format!("非法标志字节: {}", other))),
    }
}

fn read_u64_le<R: Read>(input: &mut R) -> LfifResult<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u64_be<R: Read>(input: &mut R) -> LfifResult<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// 读取一行 (到 '\n' 为止, 不含换行符); `first` 为已预读的首字节
fn read_line<R: Read>(input: &mut R, first: Option<u8>) -> LfifResult<Vec<u8>> {
    let mut line = Vec::new();
    if let Some(b) = first {
        if b == b'\n' {
            return Ok(line);
        }
        line.push(b);
    }
    loop {
        let b = read_u8(input)?;
        if b == b'\n' {
            return Ok(line);
        }
        line.push(b);
        if line.len() > 32 {
            return Err(LfifError::MagicMismatch("块边长串过长".into()));
        }
    }
}
