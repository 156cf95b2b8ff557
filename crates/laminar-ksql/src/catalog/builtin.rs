//! Built-in function table.

use super::{FunctionCategory, FunctionMapping as F};

const EXTRACT_YEAR: &str = "EXTRACT(YEAR FROM CAST({0} AS TIMESTAMP))";
const EXTRACT_MONTH: &str = "EXTRACT(MONTH FROM CAST({0} AS TIMESTAMP))";
const EXTRACT_DAY: &str = "EXTRACT(DAY FROM CAST({0} AS TIMESTAMP))";
const EXTRACT_HOUR: &str = "EXTRACT(HOUR FROM CAST({0} AS TIMESTAMP))";
const EXTRACT_MINUTE: &str = "EXTRACT(MINUTE FROM CAST({0} AS TIMESTAMP))";
const EXTRACT_SECOND: &str = "EXTRACT(SECOND FROM CAST({0} AS TIMESTAMP))";
const WEEK_OF_YEAR: &str = "CAST(FORMAT_TIMESTAMP(CAST({0} AS TIMESTAMP), 'w', 'UTC') AS INT)";
const LEFT: &str = "SUBSTRING({0}, 1, {1})";
// clamps the start position to 1 when the requested length exceeds the value
const RIGHT: &str =
    "SUBSTRING({0}, CASE WHEN LEN({0}) - {1} + 1 < 1 THEN 1 ELSE LEN({0}) - {1} + 1 END, {1})";
const INSTR_CONTAINS: &str = "INSTR({0}, {1}) > 0";

fn templated(args: usize, template: &str) -> F {
    F::exact(template, args).with_template(template)
}

fn date_add(unit: &str) -> F {
    templated(2, &format!("DATEADD('{unit}', {{1}}, {{0}})"))
}

fn cast(target: &str) -> F {
    templated(1, &format!("CAST({{0}} AS {target})"))
}

#[allow(clippy::too_many_lines)]
pub(super) fn mappings() -> Vec<(&'static str, F)> {
    vec![
        // string
        ("ToUpper", F::exact("UPPER", 1).group_by().order_by()),
        ("ToLower", F::exact("LOWER", 1).group_by().order_by()),
        ("Upper", F::exact("UPPER", 1).group_by().order_by()),
        ("Lower", F::exact("LOWER", 1).group_by().order_by()),
        ("Substring", F::range("SUBSTRING", 2, Some(3)).group_by()),
        ("Length", F::exact("LEN", 1)),
        ("Trim", F::exact("TRIM", 1)),
        ("Replace", F::exact("REPLACE", 3)),
        ("Contains", templated(2, INSTR_CONTAINS)),
        ("StartsWith", F::exact("STARTS_WITH", 2)),
        ("EndsWith", F::exact("ENDS_WITH", 2)),
        ("Split", F::exact("SPLIT", 2)),
        ("Concat", F::range("CONCAT", 2, None)),
        ("IndexOf", F::exact("INSTR", 2)),
        ("PadLeft", F::range("LPAD", 2, Some(3))),
        ("PadRight", F::range("RPAD", 2, Some(3))),
        ("Left", templated(2, LEFT).group_by()),
        ("Right", templated(2, RIGHT).group_by()),
        // math
        ("Abs", F::exact("ABS", 1).order_by()),
        ("Round", F::range("ROUND", 1, Some(2)).group_by()),
        ("Floor", F::exact("FLOOR", 1).group_by()),
        ("Ceiling", F::exact("CEIL", 1).group_by()),
        ("Sqrt", F::exact("SQRT", 1)),
        ("Power", F::exact("POWER", 2)),
        ("Sign", F::exact("SIGN", 1)),
        ("Sin", F::exact("SIN", 1)),
        ("Cos", F::exact("COS", 1)),
        ("Tan", F::exact("TAN", 1)),
        ("Log", F::range("LOG", 1, Some(2))),
        ("Log10", F::exact("LOG10", 1)),
        ("Exp", F::exact("EXP", 1)),
        // date
        ("Year", templated(1, EXTRACT_YEAR).group_by().order_by()),
        ("Month", templated(1, EXTRACT_MONTH).group_by().order_by()),
        ("Day", templated(1, EXTRACT_DAY).group_by().order_by()),
        ("Hour", templated(1, EXTRACT_HOUR).group_by()),
        ("Minute", templated(1, EXTRACT_MINUTE).group_by()),
        ("Second", templated(1, EXTRACT_SECOND).group_by()),
        ("AddDays", date_add("day")),
        ("AddHours", date_add("hour")),
        ("AddMinutes", date_add("minute")),
        ("AddSeconds", date_add("second")),
        ("AddMilliseconds", date_add("millisecond")),
        ("DayOfWeek", F::exact("DAYOFWEEK", 1).group_by()),
        ("DayOfYear", F::exact("DAYOFYEAR", 1).group_by()),
        ("WeekOfYear", templated(1, WEEK_OF_YEAR).group_by()),
        // aggregate
        ("Sum", F::exact("SUM", 1)),
        ("Count", F::range("COUNT", 0, Some(1)).special()),
        ("Max", F::exact("MAX", 1)),
        ("Min", F::exact("MIN", 1)),
        ("Average", F::exact("AVG", 1)),
        ("LatestByOffset", F::exact("LATEST_BY_OFFSET", 1)),
        ("EarliestByOffset", F::exact("EARLIEST_BY_OFFSET", 1)),
        ("CollectList", F::exact("COLLECT_LIST", 1)),
        ("CollectSet", F::exact("COLLECT_SET", 1)),
        ("CountDistinct", F::exact("COUNT_DISTINCT", 1)),
        ("Histogram", F::exact("HISTOGRAM", 1)),
        ("TopK", F::exact("TOPK", 2)),
        ("TopKDistinct", F::exact("TOPKDISTINCT", 2)),
        // array
        ("ArrayLength", F::exact("ARRAY_LENGTH", 1)),
        ("ArrayContains", F::exact("ARRAY_CONTAINS", 2)),
        ("ArraySlice", F::exact("ARRAY_SLICE", 3)),
        ("ArrayJoin", F::exact("ARRAY_JOIN", 2)),
        ("ArrayDistinct", F::exact("ARRAY_DISTINCT", 1)),
        ("ArrayExcept", F::exact("ARRAY_EXCEPT", 2)),
        ("ArrayIntersect", F::exact("ARRAY_INTERSECT", 2)),
        ("ArrayUnion", F::exact("ARRAY_UNION", 2)),
        ("ArraySort", F::exact("ARRAY_SORT", 1)),
        ("ArrayMax", F::exact("ARRAY_MAX", 1)),
        ("ArrayMin", F::exact("ARRAY_MIN", 1)),
        // json
        ("JsonExtractString", F::exact("JSON_EXTRACT_STRING", 2)),
        ("JsonArrayLength", F::exact("JSON_ARRAY_LENGTH", 1)),
        ("JsonKeys", F::exact("JSON_KEYS", 1)),
        ("JsonArrayContains", F::exact("JSON_ARRAY_CONTAINS", 2)),
        ("JsonConcat", F::range("JSON_CONCAT", 2, None)),
        ("JsonRecords", F::exact("JSON_RECORDS", 1)),
        // cast
        ("ToString", cast("VARCHAR").special().group_by()),
        ("Parse", F::exact("PARSE_{TYPE}", 1).special()),
        ("Convert", F::exact("CAST({0} AS {TYPE})", 1).special()),
        ("ToInt", cast("INTEGER")),
        ("ToLong", cast("BIGINT")),
        ("ToDouble", cast("DOUBLE")),
        ("ToDecimal", cast("DECIMAL")),
        // conditional
        ("Case", F::range("CASE", 2, None).special()),
        ("Coalesce", F::range("COALESCE", 1, None)),
        ("IfNull", F::exact("IFNULL", 2)),
        ("NullIf", F::exact("NULLIF", 2)),
        // url
        ("UrlExtractHost", F::exact("URL_EXTRACT_HOST", 1)),
        ("UrlExtractPath", F::exact("URL_EXTRACT_PATH", 1)),
        ("UrlExtractQuery", F::exact("URL_EXTRACT_QUERY", 1)),
        ("UrlExtractProtocol", F::exact("URL_EXTRACT_PROTOCOL", 1)),
        // geo
        ("GeoDistance", F::exact("GEO_DISTANCE", 4)),
        ("AsGeoJson", F::exact("AS_GEOJSON", 2)),
        // crypto
        ("Md5", F::exact("MD5", 1)),
        ("Sha1", F::exact("SHA1", 1)),
        ("Sha256", F::exact("SHA256", 1)),
        // window metadata
        ("WindowStart", templated(0, "WINDOWSTART")),
        ("RowTime", F::exact("ROWTIME", 0).order_by()),
        ("RowKey", F::exact("ROWKEY", 0)),
    ]
}

pub(super) fn category_members(category: FunctionCategory) -> &'static [&'static str] {
    match category {
        FunctionCategory::String => &[
            "ToUpper", "ToLower", "Substring", "Length", "Trim", "Replace", "Contains",
            "StartsWith", "EndsWith", "Split", "Concat", "IndexOf", "PadLeft", "PadRight",
        ],
        FunctionCategory::Math => &[
            "Abs", "Round", "Floor", "Ceiling", "Sqrt", "Power", "Sign", "Sin", "Cos", "Tan",
            "Log", "Log10", "Exp",
        ],
        FunctionCategory::Date => &[
            "AddDays", "AddHours", "AddMinutes", "AddSeconds", "AddMilliseconds", "Year",
            "Month", "Day", "Hour", "Minute", "Second", "DayOfWeek", "DayOfYear", "WeekOfYear",
        ],
        FunctionCategory::Aggregate => &[
            "Sum", "Count", "Max", "Min", "Average", "LatestByOffset", "EarliestByOffset",
            "CollectList", "CollectSet", "CountDistinct", "Histogram", "TopK", "TopKDistinct",
        ],
        FunctionCategory::Array => &[
            "ArrayLength", "ArrayContains", "ArraySlice", "ArrayJoin", "ArrayDistinct",
            "ArrayExcept", "ArrayIntersect", "ArrayUnion", "ArraySort", "ArrayMax", "ArrayMin",
        ],
        FunctionCategory::Json => &[
            "JsonExtractString", "JsonArrayLength", "JsonKeys", "JsonArrayContains",
            "JsonConcat", "JsonRecords",
        ],
        FunctionCategory::Cast => &[
            "ToString", "Parse", "Convert", "ToInt", "ToLong", "ToDouble", "ToDecimal",
        ],
        FunctionCategory::Conditional => &["Case", "Coalesce", "IfNull", "NullIf"],
        FunctionCategory::Url => &[
            "UrlExtractHost", "UrlExtractPath", "UrlExtractQuery", "UrlExtractProtocol",
        ],
        FunctionCategory::Geo => &["GeoDistance", "AsGeoJson"],
        FunctionCategory::Crypto => &["Md5", "Sha1", "Sha256"],
        FunctionCategory::Window => &["WindowStart", "RowTime", "RowKey"],
    }
}
