/// データベースとJSONの両方で大文字の文字列として扱う列挙型を定義する
///
/// 生成されるもの:
/// - serdeのSerialize/Deserialize（各バリアントの文字列で入出力）
/// - `as_str()` / `parse()` / `ALL`
/// - `Display`
/// - rusqliteの`ToSql` / `FromSql`
///
/// ```ignore
/// text_enum! {
///     pub enum Role {
///         Admin => "ADMIN",
///         User => "USER",
///     }
/// }
/// ```
#[macro_export]
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// すべてのバリアント（定義順）
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// 保存用の文字列表現
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// 文字列から変換する（未知の値はNone）
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(
                        format!("{}の値が不正です: {text}", stringify!($name)).into(),
                    )
                })
            }
        }
    };
}
