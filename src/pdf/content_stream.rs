use lopdf::content::Content;
use lopdf::Object;

/// 6要素アフィン変換行列 [a, b, c, d, e, f]
/// PDF仕様: [ a b 0 ]
///          [ c d 0 ]
///          [ e f 1 ]
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    /// 単位行列を返す。
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// self * other (行列の右乗算)
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// 回転・傾斜成分を持たないかどうか。
    pub fn is_axis_aligned(&self) -> bool {
        self.b.abs() < 1e-9 && self.c.abs() < 1e-9
    }
}

/// 矩形領域を表すバウンディングボックス（PDF座標、原点は左下）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BBox {
    pub fn width(&self) -> f64 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// 2つのBBoxの共通部分。重ならない場合はNone。
    pub fn intersect(&self, other: &BBox) -> Option<BBox> {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);
        if x_min < x_max && y_min < y_max {
            Some(BBox {
                x_min,
                y_min,
                x_max,
                y_max,
            })
        } else {
            None
        }
    }
}

/// XObjectの配置情報。
#[derive(Debug, Clone)]
pub struct ImagePlacement {
    /// XObjectの名前 (e.g. "Im1")
    pub name: String,
    /// 描画時のCTM
    pub ctm: Matrix,
    /// CTMから計算したBBox
    pub bbox: BBox,
}

/// コンテンツストリームの集計結果。分類器が使う。
#[derive(Debug, Clone, Default)]
pub struct ContentStats {
    /// Tj/TJ/'/" で表示された文字数（可視・不可視の合計）
    pub shown_chars: usize,
    /// テキストレンダリングモード3（不可視）以外で表示された文字数
    pub visible_chars: usize,
    /// パス描画オペレータ（S, f, B など）とシェーディングの数
    pub path_paint_ops: usize,
    /// 全XObjectの配置
    pub placements: Vec<ImagePlacement>,
    /// オペレータ総数
    pub operator_count: usize,
    /// 描画されたForm XObjectの数（入れ子を含む）
    pub forms_drawn: usize,
    /// Form XObject内のテキスト文字数とパス描画の合計
    pub form_vector_ops: usize,
}

impl ContentStats {
    pub fn has_text(&self) -> bool {
        self.shown_chars > 0
    }

    pub fn has_visible_text(&self) -> bool {
        self.visible_chars > 0
    }

    /// Form XObjectの中身がベクター（テキストまたはパス）を描くかどうか。
    pub fn has_vector_forms(&self) -> bool {
        self.form_vector_ops > 0
    }

    /// 描画されたForm XObjectの集計を取り込む。配置はフォーム座標系なので取り込まない。
    pub fn absorb_form(&mut self, form: &ContentStats) {
        self.shown_chars += form.shown_chars;
        self.visible_chars += form.visible_chars;
        self.path_paint_ops += form.path_paint_ops;
        self.operator_count += form.operator_count;
        self.forms_drawn += 1 + form.forms_drawn;
        self.form_vector_ops += form.shown_chars + form.path_paint_ops;
    }
}

const PATH_PAINT_OPERATORS: &[&str] = &["S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "sh"];

/// グラフィックス状態のうち、解析に必要な部分。
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text_render_mode: i64,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            ctm: Matrix::identity(),
            text_render_mode: 0,
        }
    }
}

/// コンテンツストリームを1パスで解析する。
///
/// CTMスタック(q/Q)を追跡し、cmオペレータでCTMを更新する。
/// DoオペレータでXObject名とその時点のCTM・BBoxを記録し、
/// テキスト表示オペレータの文字数とパス描画の回数を数える。
pub fn analyze_content(content_bytes: &[u8]) -> crate::error::Result<ContentStats> {
    let mut stats = ContentStats::default();
    // 空バイト列の場合、lopdfのパーサがエラーを返す可能性があるため特別扱い
    if content_bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(stats);
    }

    let content = Content::decode(content_bytes)
        .map_err(|e| crate::error::CompressError::content_stream(e.to_string()))?;

    let mut stack: Vec<GraphicsState> = vec![GraphicsState::initial()];

    for op in &content.operations {
        stats.operator_count += 1;
        match op.operator.as_str() {
            "q" => {
                let current = stack.last().cloned().unwrap_or_else(GraphicsState::initial);
                stack.push(current);
            }
            "Q" => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            "cm" => {
                if op.operands.len() == 6 {
                    let vals: Vec<f64> = op
                        .operands
                        .iter()
                        .map(operand_to_f64)
                        .collect::<Result<Vec<_>, _>>()?;
                    let cm_matrix = Matrix {
                        a: vals[0],
                        b: vals[1],
                        c: vals[2],
                        d: vals[3],
                        e: vals[4],
                        f: vals[5],
                    };
                    if let Some(current) = stack.last_mut() {
                        current.ctm = cm_matrix.multiply(&current.ctm);
                    }
                }
            }
            "Tr" => {
                if let Some(mode) = op.operands.first().and_then(|o| o.as_i64().ok())
                    && let Some(current) = stack.last_mut()
                {
                    current.text_render_mode = mode;
                }
            }
            "Tj" | "'" | "TJ" | "\"" => {
                let count = shown_text_len(&op.operator, &op.operands);
                stats.shown_chars += count;
                let invisible = stack.last().is_some_and(|s| s.text_render_mode == 3);
                if !invisible {
                    stats.visible_chars += count;
                }
            }
            "Do" => {
                if let Some(operand) = op.operands.first() {
                    let name_bytes: &[u8] = operand.as_name().map_err(|e| {
                        crate::error::CompressError::content_stream(e.to_string())
                    })?;
                    let name = String::from_utf8_lossy(name_bytes).into_owned();
                    let current_ctm = stack
                        .last()
                        .map(|s| s.ctm.clone())
                        .unwrap_or_else(Matrix::identity);
                    let bbox = ctm_to_bbox(&current_ctm);
                    stats.placements.push(ImagePlacement {
                        name,
                        ctm: current_ctm,
                        bbox,
                    });
                }
            }
            other if PATH_PAINT_OPERATORS.contains(&other) => {
                stats.path_paint_ops += 1;
            }
            _ => {}
        }
    }

    Ok(stats)
}

/// コンテンツストリームを解析し、全XObjectの配置情報を抽出する。
pub fn extract_xobject_placements(
    content_bytes: &[u8],
) -> crate::error::Result<Vec<ImagePlacement>> {
    Ok(analyze_content(content_bytes)?.placements)
}

/// テキスト表示オペレータのオペランドに含まれる文字列のバイト数。
fn shown_text_len(operator: &str, operands: &[Object]) -> usize {
    match operator {
        "TJ" => operands
            .first()
            .and_then(|o| o.as_array().ok())
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Object::String(bytes, _) => bytes.len(),
                        _ => 0,
                    })
                    .sum()
            })
            .unwrap_or(0),
        // Tj は唯一のオペランド、' と " は最後のオペランドが文字列
        _ => match operands.last() {
            Some(Object::String(bytes, _)) => bytes.len(),
            _ => 0,
        },
    }
}

/// lopdfのObjectから数値をf64として取得する。
pub(crate) fn operand_to_f64(obj: &Object) -> crate::error::Result<f64> {
    match obj {
        Object::Integer(i) => Ok(*i as f64),
        Object::Real(r) => Ok(*r as f64),
        _ => Err(crate::error::CompressError::content_stream(format!(
            "expected numeric operand, got {:?}",
            obj
        ))),
    }
}

/// CTMからBBoxを計算する。
/// 単位正方形 [0,0]-[1,1] の4頂点をCTMで変換し、min/maxを取る。
fn ctm_to_bbox(ctm: &Matrix) -> BBox {
    let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
    let transformed: Vec<(f64, f64)> = corners
        .iter()
        .map(|&(x, y)| {
            let x_prime = ctm.a * x + ctm.c * y + ctm.e;
            let y_prime = ctm.b * x + ctm.d * y + ctm.f;
            (x_prime, y_prime)
        })
        .collect();

    let x_min = transformed
        .iter()
        .map(|p| p.0)
        .fold(f64::INFINITY, f64::min);
    let y_min = transformed
        .iter()
        .map(|p| p.1)
        .fold(f64::INFINITY, f64::min);
    let x_max = transformed
        .iter()
        .map(|p| p.0)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_max = transformed
        .iter()
        .map(|p| p.1)
        .fold(f64::NEG_INFINITY, f64::max);

    BBox {
        x_min,
        y_min,
        x_max,
        y_max,
    }
}
